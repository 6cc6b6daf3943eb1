use crate::{
    transport::{IncomingRequest, IncomingResponse},
    Endpoint, Result,
};

/// A trait which provides a way to extend the SIP endpoint functionalities.
///
/// Services receive every message the transaction layer did not
/// absorb, in registration order. A service that handled the
/// message returns `Ok(true)`, which stops delivery to the
/// services after it.
#[async_trait::async_trait]
#[allow(unused_variables)]
pub trait SipService: Sync + Send + 'static {
    /// Returns the service name.
    fn name(&self) -> &str;

    /// Called when an inbound SIP request is received.
    ///
    /// Returns `true` if this service handled the request.
    async fn on_incoming_request(&self, endpoint: &Endpoint, request: &mut IncomingRequest) -> Result<bool> {
        Ok(false)
    }

    /// Called when an inbound SIP response is received.
    ///
    /// Returns `true` if this service handled the response.
    async fn on_incoming_response(&self, endpoint: &Endpoint, response: &mut IncomingResponse) -> Result<bool> {
        Ok(false)
    }
}
