use std::ops::{Deref, DerefMut};

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::SipMethod;
use crate::transaction::key::TsxKey;
use crate::transaction::{ServerTsx, State, Transaction, T1};
use crate::transport::{IncomingRequest, OutgoingResponse};

/// Represents a Server Non-INVITE transaction.
#[derive(Clone)]
pub struct TsxUas {
    transaction: Transaction,
}

impl TsxUas {
    pub(crate) fn new(endpoint: &Endpoint, request: &mut IncomingRequest) -> Self {
        let method = request.method();

        assert!(
            !matches!(method, SipMethod::Ack | SipMethod::Invite),
            "Invalid request method: {}. ACK and INVITE are not allowed here.",
            method
        );

        let mut builder = Transaction::builder();
        builder.key(TsxKey::create_server(request));
        builder.endpoint(endpoint.clone());
        builder.transport(request.transport().clone());
        builder.addr(*request.addr());
        builder.state(State::Trying);

        let uas = Self {
            transaction: builder.build(),
        };

        endpoint.get_tsx_layer().new_server_tsx(uas.clone());
        request.set_tsx(ServerTsx::NonInvite(uas.clone()));

        uas
    }

    /// Send a response and update the state.
    pub async fn respond(&self, msg: &mut OutgoingResponse<'_>) -> Result<()> {
        self.tsx_send_response(msg).await?;

        match self.get_state() {
            State::Trying if msg.is_provisional() => {
                self.set_state(State::Proceeding);
            }
            State::Trying | State::Proceeding => {
                self.set_state(State::Completed);
                self.terminate();
            }
            _ => (),
        }

        Ok(())
    }

    pub(super) fn terminate(&self) {
        if self.reliable() {
            self.on_terminated();
        } else {
            // Timer J.
            self.schedule_termination(T1 * 64);
        }
    }

    pub(crate) async fn recv_msg(&self, request: &IncomingRequest<'_>) -> Result<()> {
        match self.get_state() {
            State::Proceeding | State::Completed => {
                tracing::trace!("{} retransmission received", request.method());
                self.retransmit().await?;
            }
            // Still in Trying, no response to repeat yet.
            _ => (),
        }

        Ok(())
    }
}

impl DerefMut for TsxUas {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}

impl Deref for TsxUas {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{self, Duration};

    use super::*;
    use crate::message::StatusCode;
    use crate::transaction::mock;

    #[tokio::test]
    async fn test_receives_100_trying() {
        let mut request = mock::request(SipMethod::Options);
        let endpoint = mock::default_endpoint();
        let tsx = TsxUas::new(&endpoint, &mut request);
        let response = &mut mock::response(StatusCode::Trying);

        tsx.respond(response).await.unwrap();

        assert!(tsx.last_status_code().unwrap().as_u16() == 100);
        assert!(tsx.get_state() == State::Proceeding);
    }

    #[tokio::test]
    async fn test_receives_200_ok() {
        let mut request = mock::request(SipMethod::Options);
        let endpoint = mock::default_endpoint();
        let tsx = TsxUas::new(&endpoint, &mut request);
        let response = &mut mock::response(StatusCode::Ok);

        tsx.respond(response).await.unwrap();

        assert!(tsx.last_status_code().unwrap().as_u16() == 200);
        assert!(tsx.get_state() == State::Completed);
    }

    #[tokio::test]
    async fn test_final_after_provisional() {
        let mut request = mock::request(SipMethod::Options);
        let endpoint = mock::default_endpoint();
        let tsx = TsxUas::new(&endpoint, &mut request);

        tsx.respond(&mut mock::response(StatusCode::Trying)).await.unwrap();
        assert!(tsx.get_state() == State::Proceeding);

        tsx.respond(&mut mock::response(StatusCode::Ok)).await.unwrap();
        assert!(tsx.get_state() == State::Completed);
    }

    #[tokio::test]
    async fn test_retransmission_repeats_last_response() {
        let mut request = mock::request(SipMethod::Options);
        let endpoint = mock::default_endpoint();
        let tsx = TsxUas::new(&endpoint, &mut request);

        tsx.respond(&mut mock::response(StatusCode::Ok)).await.unwrap();
        tsx.recv_msg(&request).await.unwrap();

        assert!(tsx.retrans_count() == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_timer_j() {
        let mut request = mock::request(SipMethod::Options);
        let endpoint = mock::default_endpoint();
        let tsx = TsxUas::new(&endpoint, &mut request);
        let response = &mut mock::response(StatusCode::Ok);

        tsx.respond(response).await.unwrap();

        time::sleep(T1 * 64 + Duration::from_millis(1)).await;

        assert!(tsx.last_status_code().unwrap().as_u16() == 200);
        assert!(tsx.get_state() == State::Terminated);
    }
}
