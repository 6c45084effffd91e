use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message as WM, WebSocket};
use colab_protocol::{RoomId, ServerMessage};

use crate::rooms::Rooms;

struct Client {
	socket: WebSocket,
}

impl Client {
	async fn send(&mut self, message: &ServerMessage<'_>) -> Result<()> {
		self.send_raw(colab_protocol::encode(message)).await
	}

	async fn send_raw(&mut self, frame: String) -> Result<()> {
		Ok(self.socket.send(WM::Text(frame)).await?)
	}

	/// The next text frame, or `None` once the peer is gone.
	// TODO avoid possible DOS from excessive pings or pongs.
	async fn recv(&mut self) -> Result<Option<String>> {
		loop {
			let message = self.socket.recv().await.transpose()?;
			break match message {
				None | Some(WM::Close(_)) => Ok(None),
				Some(WM::Text(text)) => Ok(Some(text)),
				Some(WM::Binary(data)) => {
					tracing::debug!(len = data.len(), "ignoring binary frame");
					continue;
				}
				Some(WM::Ping(ping)) => {
					self.socket.send(WM::Pong(ping)).await?;
					continue;
				}
				Some(WM::Pong(_)) => {
					continue;
				}
			};
		}
	}
}

pub(crate) async fn handle_connection(rooms: &Arc<Rooms>, room: RoomId, socket: WebSocket) -> Result<()> {
	let mut client = Client { socket };

	let Some(mut membership) = rooms.join(&room) else {
		tracing::info!(%room, "closing socket for unknown room");
		client.socket.close().await?;
		return Ok(());
	};
	tracing::info!(%room, member = membership.member(), "member joined");

	// Initialize client.
	let init_message = ServerMessage::Init {
		code: membership.initial_code().into(),
	};
	client.send(&init_message).await?;

	loop {
		tokio::select! {
			frame = membership.next_frame() => match frame {
				Some(frame) => client.send_raw(frame.to_string()).await?,
				None => break,
			},
			frame = client.recv() => match frame? {
				Some(frame) => {
					tracing::debug!(%room, member = membership.member(), len = frame.len(), "frame");
					membership.publish(&frame);
				}
				None => break,
			}
		}
	}

	Ok(())
}
