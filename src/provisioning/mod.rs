pub mod artifact;
pub mod expiry;
pub mod reconciler;

pub use artifact::{connection_uri, render_qr_png, ConnectionArtifact, ConnectionEndpoint};
pub use expiry::{expiry_ms, quota_bytes, remaining_days, RemainingDays};
pub use reconciler::{
    EntitlementStatus, ProvisionKind, ProvisionedEntitlement, ProvisioningPolicy,
    ProvisioningReconciler,
};
