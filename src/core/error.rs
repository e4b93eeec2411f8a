use thiserror::Error;

use super::types::AccountKind;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("unknown account type: {kind}")]
    UnknownAccount { kind: AccountKind },

    #[error("non-finite value in {context}")]
    NonFinite { context: &'static str },
}
