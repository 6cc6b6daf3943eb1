use std::cmp;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use futures_util::future::{self, Either};
use tokio::pin;
use tokio::sync::oneshot;
use tokio::time;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::SipMethod;
use crate::transaction::key::TsxKey;
use crate::transaction::{ServerTsx, State, Transaction, T1, T2, T4};
use crate::transport::{IncomingRequest, OutgoingResponse};

type TxConfirmed = Arc<Mutex<Option<oneshot::Sender<()>>>>;
type RxConfirmed = oneshot::Receiver<()>;

/// Represents a Server INVITE transaction.
#[derive(Clone)]
pub struct TsxUasInv {
    transaction: Transaction,
    tx_confirmed: TxConfirmed,
}

impl TsxUasInv {
    pub(crate) fn new(endpoint: &Endpoint, request: &mut IncomingRequest<'_>) -> Self {
        let method = request.method();

        assert!(
            matches!(method, SipMethod::Invite),
            "Expected INVITE for a server INVITE transaction, but got: {}",
            method
        );

        let mut builder = Transaction::builder();
        builder.key(TsxKey::create_server(request));
        builder.endpoint(endpoint.clone());
        builder.transport(request.transport().clone());
        builder.addr(*request.addr());
        builder.state(State::Proceeding);

        let uas_inv = TsxUasInv {
            transaction: builder.build(),
            tx_confirmed: Default::default(),
        };

        endpoint.get_tsx_layer().new_server_inv_tsx(uas_inv.clone());
        request.set_tsx(ServerTsx::Invite(uas_inv.clone()));

        uas_inv
    }

    /// Send a response and update the state.
    pub async fn respond(&self, response: &mut OutgoingResponse<'_>) -> Result<()> {
        self.tsx_send_response(response).await?;

        let code = response.status_code().as_u16();

        match code {
            100..=199 => {
                self.set_state(State::Proceeding);
            }
            200..=299 => {
                // RFC 6026: linger to absorb INVITE retransmissions.
                // Retransmitting the 2xx until the ACK arrives is the
                // job of the TU, and the ACK of a 2xx carries a fresh
                // branch, so it never matches this transaction.
                self.set_state(State::Accepted);
                self.schedule_termination(64 * T1);
            }
            300..=699 => {
                self.set_state(State::Completed);

                let (tx, rx) = oneshot::channel();

                self.tx_confirmed.lock().expect("Lock failed").replace(tx);
                self.initiate_retransmission(rx);
            }
            _ => (),
        };

        Ok(())
    }

    fn initiate_retransmission(&self, mut rx_confirmed: RxConfirmed) {
        let unreliable = !self.reliable();
        let uas = self.clone();

        tokio::spawn(async move {
            let timer_h = time::sleep(64 * T1);
            let timer_g = if unreliable {
                Either::Left(time::sleep(T1))
            } else {
                Either::Right(future::pending::<()>())
            };

            pin!(timer_h);
            pin!(timer_g);

            'retrans: loop {
                tokio::select! {
                    _ = &mut timer_g => {
                        match uas.retransmit().await {
                            Ok(retrans) => {
                                let retrans = T1 * (1 << retrans);
                                let interval = cmp::min(retrans, T2);
                                let sleep = time::sleep(interval);
                                timer_g.set(Either::Left(sleep));
                            },
                            Err(err) => {
                                tracing::info!("Failed to retransmit: {}", err);
                            },
                        }
                    },
                    _ = &mut timer_h => {
                        // Timer H expired, no ACK ever came.
                        uas.on_terminated();
                        break 'retrans;
                    }
                    _ = &mut rx_confirmed => {
                        break 'retrans;
                    }
                }
            }
        });
    }

    pub(super) fn terminate(&self) {
        if self.reliable() {
            self.on_terminated();
        } else {
            // Timer I.
            self.schedule_termination(T4);
        }
    }

    pub(crate) async fn recv_msg(&self, request: &IncomingRequest<'_>) -> Result<()> {
        match request.method() {
            SipMethod::Invite => match self.get_state() {
                State::Proceeding | State::Completed => {
                    tracing::trace!("INVITE retransmission received");
                    self.retransmit().await?;
                }
                State::Accepted => {
                    tracing::trace!("INVITE retransmission absorbed");
                }
                _ => (),
            },
            SipMethod::Ack => {
                if self.get_state() == State::Completed {
                    self.set_state(State::Confirmed);

                    if let Some(tx) = self.tx_confirmed.lock().expect("Lock failed").take() {
                        let _ = tx.send(());
                    }
                    self.terminate();
                }
            }
            _ => (),
        }

        Ok(())
    }
}

impl Deref for TsxUasInv {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}
