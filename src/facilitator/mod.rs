//! The verify/settle capability consumed by the Payment Middleware, with two concrete
//! forms: a [`remote::RemoteFacilitator`] delegating to an external HTTP service, and a
//! [`local::LocalFacilitator`] that verifies and settles directly against an EVM chain.

pub mod local;
pub mod remote;

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::types::PaymentRequirement;

/// Identity of the party who signed a verified payment authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payer(pub String);

/// Verify/settle capability. Implementors parse `payload_bytes`/`requirements_bytes`
/// themselves so the middleware stays agnostic to the wire format.
pub trait Facilitator {
    type Error: Debug + Display + Send + Sync + 'static;

    fn verify(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<Payer, Self::Error>> + Send;

    fn settle(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T> Facilitator for Arc<T>
where
    T: Facilitator + Send + Sync,
{
    type Error = T::Error;

    fn verify(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<Payer, Self::Error>> + Send {
        T::verify(self, payload_bytes, requirement)
    }

    fn settle(
        &self,
        payload_bytes: &[u8],
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        T::settle(self, payload_bytes, requirement)
    }
}
