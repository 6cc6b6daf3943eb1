//! Media plane for established calls.
//!
//! A [`MediaSession`] owns one RTP socket for the lifetime of a
//! call. Incoming G.711 audio is decoded and appended to a WAV
//! recording while the raw payload is echoed back to the peer
//! under the session's own RTP identity.

pub mod g711;
pub mod rtp;
pub mod sdp;

pub use g711::Codec;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;

use crate::error::Result;
use rtp::RtpHeader;

/// Size of the RTP receive buffer.
const RECV_BUF_SIZE: usize = 2000;

/// Parameters of a single call's media stream.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Local address the RTP socket binds on, with an ephemeral
    /// port.
    pub local_ip: IpAddr,
    /// The negotiated codec.
    pub codec: Codec,
    /// Peer address taken from the SDP offer.
    pub remote: SocketAddr,
    /// Path of the WAV file the inbound audio is written to.
    pub recording: PathBuf,
}

/// The media stream of one established call.
///
/// Streaming is symmetric RTP: the SDP offer provides the initial
/// peer address, but the source of the first packet received
/// becomes the echo target, so peers behind NAT are answered
/// where they actually send from.
pub struct MediaSession {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<Result<()>>,
}

impl MediaSession {
    /// Binds an RTP socket, creates the recording file and starts
    /// the receive loop.
    pub async fn start(config: MediaConfig) -> Result<MediaSession> {
        let socket = UdpSocket::bind((config.local_ip, 0)).await?;
        let local_addr = socket.local_addr()?;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&config.recording, spec)?;

        tracing::debug!(
            "Media session on {} (codec={}, peer={}, recording to {})",
            local_addr,
            config.codec,
            config.remote,
            config.recording.display()
        );

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::stream(socket, config, writer, stop_rx));

        Ok(MediaSession {
            local_addr,
            stop,
            task,
        })
    }

    /// The bound RTP address, advertised in the SDP answer.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops streaming and finalizes the recording.
    pub async fn stop(self) -> Result<()> {
        drop(self.stop);

        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("Media task join error: {}", err),
            )
            .into()),
        }
    }

    async fn stream(
        socket: UdpSocket,
        config: MediaConfig,
        mut writer: hound::WavWriter<io::BufWriter<std::fs::File>>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<()> {
        let codec = config.codec;
        let mut target = config.remote;
        let mut latched = false;

        // Our own RTP identity for the echoed stream.
        let ssrc: u32 = rand::random();
        let mut sequence: u16 = rand::random();
        let mut timestamp: u32 = rand::random();
        let mut marker = true;

        let mut buf = vec![0u8; RECV_BUF_SIZE];

        loop {
            let (len, src) = tokio::select! {
                _ = &mut stop => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!("RTP receive error: {}", err);
                        continue;
                    }
                },
            };

            let (header, payload) = match RtpHeader::decode(&buf[..len]) {
                Ok(decoded) => decoded,
                Err(err) => {
                    tracing::trace!("Dropping malformed packet from {}: {}", src, err);
                    continue;
                }
            };

            if header.payload_type != codec.payload_type() {
                tracing::trace!("Dropping packet with payload type {}", header.payload_type);
                continue;
            }

            if !latched {
                latched = true;
                if src != target {
                    tracing::debug!("RTP peer latched to {} (offer said {})", src, target);
                    target = src;
                }
            }

            for &byte in payload {
                writer.write_sample(codec.decode_sample(byte))?;
            }

            let echo = RtpHeader {
                marker,
                payload_type: codec.payload_type(),
                sequence,
                timestamp,
                ssrc,
            };
            if let Err(err) = socket.send_to(&echo.encode(payload), target).await {
                tracing::warn!("RTP send error: {}", err);
            }

            marker = false;
            sequence = sequence.wrapping_add(1);
            timestamp = timestamp.wrapping_add(payload.len() as u32);
        }

        writer.finalize()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use g711::ulaw_to_linear;
    use std::time::Duration;

    fn pcmu_packet(sequence: u16, payload: &[u8]) -> bytes::Bytes {
        RtpHeader {
            marker: false,
            payload_type: g711::PAYLOAD_TYPE_PCMU,
            sequence,
            timestamp: u32::from(sequence) * 160,
            ssrc: 0xdecafbad,
        }
        .encode(payload)
    }

    async fn recv_echo(socket: &UdpSocket) -> (RtpHeader, Vec<u8>) {
        let mut buf = [0u8; RECV_BUF_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("no echo received")
            .unwrap();
        let (header, payload) = RtpHeader::decode(&buf[..len]).unwrap();
        (header, payload.to_vec())
    }

    #[tokio::test]
    async fn test_session_echoes_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("test.wav");
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let session = MediaSession::start(MediaConfig {
            local_ip: "127.0.0.1".parse().unwrap(),
            codec: Codec::Pcmu,
            remote: caller.local_addr().unwrap(),
            recording: recording.clone(),
        })
        .await
        .unwrap();

        let payload = [0xFFu8; 160];
        caller
            .send_to(&pcmu_packet(1, &payload), session.local_addr())
            .await
            .unwrap();

        let (header, echoed) = recv_echo(&caller).await;
        assert_eq!(echoed, payload);
        assert_ne!(header.ssrc, 0xdecafbad);
        assert!(header.marker);

        session.stop().await.unwrap();

        let mut reader = hound::WavReader::open(&recording).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 160);
        let first = reader.samples::<i16>().next().unwrap().unwrap();
        assert_eq!(first, ulaw_to_linear(0xFF));
    }

    #[tokio::test]
    async fn test_session_latches_to_first_sender() {
        let dir = tempfile::tempdir().unwrap();
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let decoy = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let session = MediaSession::start(MediaConfig {
            local_ip: "127.0.0.1".parse().unwrap(),
            codec: Codec::Pcmu,
            remote: decoy.local_addr().unwrap(),
            recording: dir.path().join("latch.wav"),
        })
        .await
        .unwrap();

        caller
            .send_to(&pcmu_packet(1, &[0xFF; 8]), session.local_addr())
            .await
            .unwrap();

        // The echo must come back to the actual sender, not to the
        // address the offer advertised.
        let (_, echoed) = recv_echo(&caller).await;
        assert_eq!(echoed, [0xFF; 8]);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_session_ignores_foreign_payload_types() {
        let dir = tempfile::tempdir().unwrap();
        let recording = dir.path().join("filter.wav");
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let session = MediaSession::start(MediaConfig {
            local_ip: "127.0.0.1".parse().unwrap(),
            codec: Codec::Pcmu,
            remote: caller.local_addr().unwrap(),
            recording: recording.clone(),
        })
        .await
        .unwrap();

        let dtmf = RtpHeader {
            marker: false,
            payload_type: 101,
            sequence: 1,
            timestamp: 0,
            ssrc: 0xdecafbad,
        }
        .encode(&[1, 2, 3, 4]);
        caller.send_to(&dtmf, session.local_addr()).await.unwrap();

        let voice = [0x00u8; 160];
        caller
            .send_to(&pcmu_packet(2, &voice), session.local_addr())
            .await
            .unwrap();

        // The first echo is the voice packet; the DTMF one was
        // dropped.
        let (_, echoed) = recv_echo(&caller).await;
        assert_eq!(echoed, voice);

        session.stop().await.unwrap();

        let reader = hound::WavReader::open(&recording).unwrap();
        assert_eq!(reader.len(), 160);
    }
}
