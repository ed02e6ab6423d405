pub mod gateway;
pub mod models;
pub mod providers;
pub mod workflow;

pub use gateway::PaymentGateway;
pub use models::{
    CreatedPayment, LineItem, PaymentAction, PaymentIntent, PaymentRequest, PaymentSettings,
    PaymentStatus, ProviderCredentials, ProviderKey, ReturnUrls,
};
pub use providers::{
    build_provider, BankCardProvider, PaymentProvider, SbpProvider, YooMoneyProvider,
};
pub use workflow::{PaymentPricing, PaymentWorkflow, Settlement};
