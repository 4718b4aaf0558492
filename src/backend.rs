use crate::classify::RawResponse;
use crate::domain::ContractId;
use crate::error::HarvestError;

/// One way of retrieving a single contract.
///
/// A backend owns its session (HTTP client or browser). It is acquired when the
/// backend is constructed and released by [`RetrievalBackend::close`].
pub trait RetrievalBackend: Send {
    fn name(&self) -> &'static str;

    fn fetch(&mut self, id: &ContractId) -> Result<RawResponse, HarvestError>;

    fn close(&mut self) -> Result<(), HarvestError> {
        Ok(())
    }
}

impl<B: RetrievalBackend + ?Sized> RetrievalBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn fetch(&mut self, id: &ContractId) -> Result<RawResponse, HarvestError> {
        (**self).fetch(id)
    }

    fn close(&mut self) -> Result<(), HarvestError> {
        (**self).close()
    }
}
