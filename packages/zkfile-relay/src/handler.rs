//! Connection handler.
//!
//! Runs one accepted connection from start to finish: zero-knowledge
//! identification, then (on success) the encrypted file upload. Every
//! failure is confined to this connection.

use std::net::SocketAddr;

use rand::rngs::OsRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::Instrument;
use zkfile_core::network::{FileReceiver, TransferState};
use zkfile_core::{AuthOutcome, Channel, Error, ProofSession};

use crate::protocol::{ConnectionId, ConnectionStatus};
use crate::state::ServerState;

/// Handle a single connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Registers the connection (removed again when this returns)
/// 2. Runs the verifier side of the identification exchange
/// 3. Receives, decrypts and stores one file from an accepted prover
///
/// Returns the status the connection ended in.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, state: ServerState) -> ConnectionStatus
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let guard = state.register(peer);
    let id = guard.id();
    let span = tracing::info_span!("conn", conn_id = %id.id, %peer);

    async move {
        tracing::info!("client connected");
        let status = match serve(stream, &state, id).await {
            Ok(status) => status,
            Err(Error::ConnectionClosed) => {
                tracing::info!("client disconnected mid-session");
                ConnectionStatus::Failed
            }
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "session aborted");
                ConnectionStatus::Failed
            }
        };
        state.set_status(&id, status);
        tracing::info!(?status, "connection finished");
        drop(guard);
        status
    }
    .instrument(span)
    .await
}

async fn serve<S>(
    stream: S,
    state: &ServerState,
    id: ConnectionId,
) -> zkfile_core::Result<ConnectionStatus>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = state.config.session_config();

    // ── Step 1: Identification ────────────────────────────────────────────

    state.set_status(&id, ConnectionStatus::Authenticating);
    let channel = Channel::new(stream, config.io_timeout);
    let mut session = ProofSession::new(channel, config);
    let outcome = session.authenticate(&mut OsRng).await;
    state.set_scheme(&id, session.scheme_kind());

    if outcome? == AuthOutcome::Rejected {
        return Ok(ConnectionStatus::Rejected);
    }
    state.set_status(&id, ConnectionStatus::Authenticated);

    // ── Step 2: File Transfer ─────────────────────────────────────────────

    let mut channel = session.into_channel();
    let mut receiver = FileReceiver::new(&state.files, id.file_tag(), state.config.max_file_size);
    let mut reached = TransferState::AwaitingName;
    let received = receiver
        .receive(&mut channel, |transfer, bytes| {
            if !transfer.is_terminal() {
                reached = transfer;
            }
            if transfer == TransferState::AwaitingCipher {
                state.set_status(&id, ConnectionStatus::Transferring);
            }
            state.set_transfer(&id, transfer, bytes);
        })
        .await;

    match received {
        Ok(file) => {
            state.set_file_name(&id, &file.name);
            tracing::info!(
                file = %file.name,
                path = %file.path.display(),
                bytes = file.bytes,
                "file received"
            );
            Ok(ConnectionStatus::Completed)
        }
        // An authenticated client may leave without uploading anything
        Err(Error::ConnectionClosed) if reached == TransferState::AwaitingName => {
            tracing::info!("client left without sending a file");
            Ok(ConnectionStatus::Authenticated)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;
    use zkfile_core::config::reference_secret;
    use zkfile_core::network::{send_file, Frame};
    use zkfile_core::{
        CipherKey, DeploymentParameters, IdentificationScheme, ProverSession, ReceivedFiles,
        Scheme, SchemeKind,
    };

    fn peer() -> SocketAddr {
        "192.0.2.1:40000".parse().unwrap()
    }

    async fn server_state(dir: &tempfile::TempDir) -> ServerState {
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let config = ServerConfig {
            io_timeout: Duration::from_secs(5),
            ..ServerConfig::default()
        };
        ServerState::new(config, files)
    }

    async fn prove_and_send(
        stream: tokio::io::DuplexStream,
        kind: SchemeKind,
        secret: num_bigint::BigUint,
        file: Option<(&str, &str)>,
    ) -> zkfile_core::Result<(AuthOutcome, Option<String>)> {
        let scheme = Scheme::for_kind(kind, &DeploymentParameters::default())?;
        let keys = scheme.key_pair_from_secret(secret)?;
        let key = CipherKey::from_identity(&scheme, &keys)?;

        let channel = Channel::new(stream, Duration::from_secs(5));
        let mut prover = ProverSession::new(channel, scheme, keys, 1);
        let outcome = prover
            .authenticate(&mut StdRng::seed_from_u64(kind.selector() as u64))
            .await?;
        let mut channel = prover.into_channel();

        let ack = match (outcome, file) {
            (AuthOutcome::Accepted, Some((name, text))) => {
                Some(send_file(&mut channel, name, text, &key).await?)
            }
            _ => None,
        };
        Ok((outcome, ack))
    }

    #[tokio::test]
    async fn test_every_scheme_uploads_a_file() {
        for kind in SchemeKind::ALL {
            let dir = tempfile::tempdir().unwrap();
            let state = server_state(&dir).await;
            let (server, client) = tokio::io::duplex(64 * 1024);

            let text = format!("payload for {kind}\nline two");
            let (status, client_result) = tokio::join!(
                handle_connection(server, peer(), state.clone()),
                prove_and_send(client, kind, reference_secret(kind), Some(("report.txt", text.as_str())))
            );

            assert_eq!(status, ConnectionStatus::Completed, "{kind}");
            let (outcome, ack) = client_result.unwrap();
            assert_eq!(outcome, AuthOutcome::Accepted);
            assert!(ack.unwrap().contains("report.txt"));

            let saved: Vec<_> = std::fs::read_dir(dir.path())
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            assert_eq!(saved.len(), 1);
            assert!(saved[0]
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with("_report.txt"));
            assert_eq!(std::fs::read_to_string(&saved[0]).unwrap(), text);

            let stats = state.stats();
            assert_eq!(stats.active_connections, 0);
            assert_eq!(stats.total_authenticated, 1);
            assert_eq!(stats.total_files_received, 1);
        }
    }

    #[tokio::test]
    async fn test_impostor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = server_state(&dir).await;
        let (server, client) = tokio::io::duplex(64 * 1024);

        // Valid key pair, but not the pinned identity
        let (status, client_result) = tokio::join!(
            handle_connection(server, peer(), state.clone()),
            prove_and_send(
                client,
                SchemeKind::Schnorr,
                48u32.into(),
                Some(("x.txt", "never sent"))
            )
        );

        assert_eq!(status, ConnectionStatus::Rejected);
        assert_eq!(client_result.unwrap(), (AuthOutcome::Rejected, None));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(state.stats().total_authenticated, 0);
    }

    #[tokio::test]
    async fn test_authenticated_client_may_leave() {
        let dir = tempfile::tempdir().unwrap();
        let state = server_state(&dir).await;
        let (server, client) = tokio::io::duplex(64 * 1024);

        let (status, client_result) = tokio::join!(
            handle_connection(server, peer(), state),
            prove_and_send(
                client,
                SchemeKind::FiatShamir,
                reference_secret(SchemeKind::FiatShamir),
                None
            )
        );
        assert_eq!(client_result.unwrap().0, AuthOutcome::Accepted);
        assert_eq!(status, ConnectionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_invalid_selector_gets_error_frame() {
        let dir = tempfile::tempdir().unwrap();
        let state = server_state(&dir).await;
        let (server, client) = tokio::io::duplex(1024);

        let client_side = async move {
            let mut channel = Channel::new(client, Duration::from_secs(5));
            channel.send_text("7").await.unwrap();
            channel.recv_frame().await.unwrap()
        };
        let (status, reply) = tokio::join!(handle_connection(server, peer(), state.clone()), client_side);

        assert_eq!(status, ConnectionStatus::Failed);
        assert!(matches!(reply, Frame::Error(_)));
        assert_eq!(state.active_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_connections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let state = server_state(&dir).await;

        let mut tasks = Vec::new();
        for i in 0..4 {
            let (server, client) = tokio::io::duplex(64 * 1024);
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                handle_connection(server, peer(), state).await
            }));
            tasks.push(tokio::spawn(async move {
                let kind = SchemeKind::FiatShamir;
                // Every other client is an impostor
                let secret = if i % 2 == 0 {
                    reference_secret(kind)
                } else {
                    124u32.into()
                };
                let _ = prove_and_send(client, kind, secret, Some(("same.txt", "hi"))).await;
                ConnectionStatus::Connected
            }));
        }

        let mut completed = 0;
        for task in tasks {
            if task.await.unwrap() == ConnectionStatus::Completed {
                completed += 1;
            }
        }
        assert_eq!(completed, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
        assert_eq!(state.active_count(), 0);
    }
}
