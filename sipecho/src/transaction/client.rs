use std::net::SocketAddr;
use std::sync::Arc;
use std::{cmp, mem};

use bytes::Bytes;
use futures_util::future::{self, Either};
use tokio::pin;
use tokio::sync::mpsc;
use tokio::time::{self, timeout_at, Instant};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::find_map_header;
use crate::headers::{SipHeaderParse, Via};
use crate::message::SipMethod;
use crate::parser::Parser;
use crate::transaction::key::TsxKey;
use crate::transaction::{State, T1, T2, T4};
use crate::transport::{OutgoingRequest, Packet, ToBytes, Transport};

/// Represents a Client Non-INVITE transaction.
///
/// Unlike the server transactions, which live in the
/// [`TransactionLayer`](super::TransactionLayer) and are driven
/// by incoming retransmissions, a client transaction is owned
/// by the caller: [`TsxUac::send`] transmits the request and
/// [`TsxUac::receive_final`] drives the retransmission and
/// timeout timers until a final response arrives.
pub struct TsxUac {
    key: TsxKey,
    endpoint: Endpoint,
    state: State,
    receiver: mpsc::Receiver<Packet>,
    buf: Bytes,
    addr: SocketAddr,
    transport: Arc<dyn Transport>,
    deadline: Instant,
}

impl TsxUac {
    /// Sends the request and creates the client transaction for
    /// it.
    pub async fn send(endpoint: &Endpoint, request: &mut OutgoingRequest<'_>) -> Result<TsxUac> {
        let method = request.msg.method();

        assert!(
            !matches!(method, SipMethod::Ack | SipMethod::Invite),
            "Invalid request method: {}. ACK and INVITE are not allowed here.",
            method
        );

        let branch = find_map_header!(request.msg.headers, Via)
            .and_then(|via| via.branch())
            .ok_or(Error::MissingRequiredHeader(Via::NAME))?;
        let key = TsxKey::create_client(method, branch);

        let buf = match request.buf.take() {
            Some(buf) => buf,
            None => request.to_bytes()?,
        };

        tracing::debug!("=> Request {} ({} bytes)", method, buf.len());
        request.transport.send(&buf, &request.addr).await?;

        let (sender, receiver) = mpsc::channel(10);
        endpoint.get_tsx_layer().add_client_tsx(key.clone(), sender);

        let uac = TsxUac {
            key,
            endpoint: endpoint.clone(),
            state: State::Trying,
            receiver,
            buf,
            addr: request.addr,
            transport: request.transport.clone(),
            deadline: Instant::now() + T1 * 64,
        };

        tracing::trace!("Transaction created [UAC] ({:p})", &uac);

        Ok(uac)
    }

    /// Returns the key identifying this transaction.
    pub fn key(&self) -> &TsxKey {
        &self.key
    }

    /// Waits for the final response of this transaction.
    ///
    /// Provisional responses are consumed internally and only
    /// move the transaction to `Proceeding`. While waiting, the
    /// request is retransmitted at timer E intervals; if no
    /// final response arrives before timer F fires, this
    /// returns [`Error::TsxTimeout`].
    ///
    /// The raw packet is returned so the caller can parse the
    /// response borrowing from it.
    pub async fn receive_final(mut self) -> Result<Packet> {
        let reliable = self.transport.reliable();
        let mut retrans_interval = T1;

        let timer_f = time::sleep_until(self.deadline);
        let timer_e = if reliable {
            Either::Right(future::pending::<()>())
        } else {
            Either::Left(time::sleep(T1))
        };

        pin!(timer_f);
        pin!(timer_e);

        let packet = loop {
            tokio::select! {
                msg = self.receiver.recv() => {
                    let Some(packet) = msg else {
                        return Err(Error::ChannelClosed);
                    };
                    let code = match Parser::new(packet.payload.buf()).parse_sip_msg() {
                        Ok(msg) => match msg.response() {
                            Some(response) => response.code(),
                            None => continue,
                        },
                        Err(err) => {
                            tracing::warn!("Discarding malformed response: {}", err);
                            continue;
                        }
                    };

                    if code.is_provisional() {
                        self.set_state(State::Proceeding);
                        // Timer E ticks at T2 once a provisional
                        // response has been seen.
                        retrans_interval = T2;
                        continue;
                    }

                    break packet;
                }
                _ = &mut timer_e => {
                    self.transport.send(&self.buf, &self.addr).await?;
                    retrans_interval = cmp::min(retrans_interval * 2, T2);
                    timer_e.set(Either::Left(time::sleep(retrans_interval)));
                }
                _ = &mut timer_f => {
                    self.set_state(State::Terminated);
                    return Err(Error::TsxTimeout);
                }
            }
        };

        self.set_state(State::Completed);

        if reliable {
            self.set_state(State::Terminated);
            return Ok(packet);
        }

        // Timer K: absorb response retransmissions before the
        // transaction is removed from the layer.
        let timer_k = Instant::now() + T4;
        tokio::spawn(async move {
            while let Ok(Some(_)) = timeout_at(timer_k, self.receiver.recv()).await {}
            self.set_state(State::Terminated);
        });

        Ok(packet)
    }

    fn set_state(&mut self, state: State) {
        let old = mem::replace(&mut self.state, state);
        tracing::trace!("State changed [{old:?} -> {state:?}] ({:p})", &*self);
    }
}

impl Drop for TsxUac {
    fn drop(&mut self) {
        self.endpoint.get_tsx_layer().remove_client_tsx(&self.key);
        tracing::trace!("Transaction destroyed [UAC] ({:p})", &*self);
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use tokio::time::Duration;

    use super::*;
    use crate::message::StatusCode;
    use crate::transaction::mock;
    use crate::transport::udp::mock::MockUdpTransport;
    use crate::transport::Payload;

    const RAW_100: &[u8] = b"SIP/2.0 100 Trying\r\n\
        Via: SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK74bf9\r\n\
        CSeq: 1 REGISTER\r\n\
        Content-Length: 0\r\n\r\n";

    const RAW_200: &[u8] = b"SIP/2.0 200 OK\r\n\
        Via: SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK74bf9\r\n\
        CSeq: 1 REGISTER\r\n\
        Content-Length: 0\r\n\r\n";

    fn packet(bytes: &'static [u8]) -> Packet {
        Packet {
            payload: Payload::new(Bytes::from_static(bytes)),
            addr: "127.0.0.1:5060".parse().unwrap(),
            time: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_receives_final_response() {
        let endpoint = mock::default_endpoint();
        let mut request = mock::outgoing_request(SipMethod::Register);

        let uac = TsxUac::send(&endpoint, &mut request).await.unwrap();

        let sender = endpoint.get_tsx_layer().find_client_tsx(uac.key()).unwrap();
        sender.send(packet(RAW_200)).await.unwrap();

        let packet = uac.receive_final().await.unwrap();
        let msg = Parser::new(packet.payload.buf()).parse_sip_msg().unwrap();

        assert_eq!(msg.response().unwrap().code(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn test_provisional_does_not_finish_transaction() {
        let endpoint = mock::default_endpoint();
        let mut request = mock::outgoing_request(SipMethod::Register);

        let uac = TsxUac::send(&endpoint, &mut request).await.unwrap();

        let sender = endpoint.get_tsx_layer().find_client_tsx(uac.key()).unwrap();
        sender.send(packet(RAW_100)).await.unwrap();
        sender.send(packet(RAW_200)).await.unwrap();

        let packet = uac.receive_final().await.unwrap();
        let msg = Parser::new(packet.payload.buf()).parse_sip_msg().unwrap();

        assert_eq!(msg.response().unwrap().code(), StatusCode::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_f_times_out() {
        let endpoint = mock::default_endpoint();
        let mut request = mock::outgoing_request(SipMethod::Register);

        let uac = TsxUac::send(&endpoint, &mut request).await.unwrap();
        let err = uac.receive_final().await.unwrap_err();

        assert_matches!(err, Error::TsxTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_e_retransmits() {
        let endpoint = mock::default_endpoint();
        let transport = Arc::new(MockUdpTransport::default());
        let mut request = mock::outgoing_request_with(SipMethod::Register, transport.clone());

        let uac = TsxUac::send(&endpoint, &mut request).await.unwrap();
        assert_eq!(transport.sent_count(), 1);

        let handle = tokio::spawn(uac.receive_final());

        time::sleep(T1 + Duration::from_millis(1)).await;
        assert_eq!(transport.sent_count(), 2);

        time::sleep(T1 * 2 + Duration::from_millis(1)).await;
        assert_eq!(transport.sent_count(), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_drop_removes_transaction() {
        let endpoint = mock::default_endpoint();
        let mut request = mock::outgoing_request(SipMethod::Register);

        let uac = TsxUac::send(&endpoint, &mut request).await.unwrap();
        let key = uac.key().clone();

        assert!(endpoint.get_tsx_layer().find_client_tsx(&key).is_some());
        drop(uac);
        assert!(endpoint.get_tsx_layer().find_client_tsx(&key).is_none());
    }
}
