use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("smtp error: {0}")]
    Smtp(String),

    #[error("discord webhook error: {0}")]
    Discord(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] fx_core::StoreError),
}
