//! End-to-end tests against a real server on an ephemeral port.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use colab_protocol::{RoomCreated, RoomId, ServerMessage, SuggestionRequest, SuggestionResponse};
use colab_server::Rooms;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, Arc<Rooms>) {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let address = listener.local_addr().unwrap();
	let rooms = Arc::new(Rooms::new(64));
	tokio::spawn(colab_server::serve(listener, Arc::clone(&rooms)));
	(address, rooms)
}

async fn create_room(address: SocketAddr) -> RoomId {
	let created: RoomCreated = reqwest::Client::new()
		.post(format!("http://{address}/rooms"))
		.send()
		.await
		.unwrap()
		.json()
		.await
		.unwrap();
	created.room_id
}

async fn join(address: SocketAddr, room: &RoomId) -> Socket {
	let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{address}/ws/{room}"))
		.await
		.unwrap();
	socket
}

async fn next_text(socket: &mut Socket) -> String {
	loop {
		let message = timeout(Duration::from_secs(2), socket.next())
			.await
			.expect("timed out waiting for a frame")
			.expect("socket ended")
			.expect("socket error");
		if message.is_text() {
			return message.to_text().unwrap().to_owned();
		}
	}
}

async fn send_text(socket: &mut Socket, frame: &str) {
	socket.send(Message::text(frame.to_owned())).await.unwrap();
}

async fn init_code(socket: &mut Socket) -> String {
	match colab_protocol::decode::<ServerMessage<'_>>(&next_text(socket).await).unwrap() {
		ServerMessage::Init { code } => code.into_owned(),
		other => panic!("expected init, got {other:?}"),
	}
}

#[tokio::test]
async fn new_room_starts_empty() {
	let (address, _) = start_server().await;
	let room = create_room(address).await;

	let mut socket = join(address, &room).await;
	assert_eq!(init_code(&mut socket).await, "");
}

#[tokio::test]
async fn updates_reach_others_and_not_the_sender() {
	let (address, _) = start_server().await;
	let room = create_room(address).await;

	let mut alice = join(address, &room).await;
	init_code(&mut alice).await;
	let mut bob = join(address, &room).await;
	init_code(&mut bob).await;

	let frame = r#"{"type":"code_update","code":"x=2"}"#;
	send_text(&mut alice, frame).await;
	assert_eq!(next_text(&mut bob).await, frame);

	// Alice hears nothing back.
	assert!(timeout(Duration::from_millis(200), alice.next()).await.is_err());
}

#[tokio::test]
async fn late_joiner_gets_current_text() {
	let (address, rooms) = start_server().await;
	let room = create_room(address).await;

	let mut alice = join(address, &room).await;
	init_code(&mut alice).await;
	let mut bob = join(address, &room).await;
	init_code(&mut bob).await;

	send_text(&mut alice, r#"{"type":"code_update","code":"x=1"}"#).await;
	next_text(&mut bob).await;
	assert_eq!(rooms.code(&room).as_deref(), Some("x=1"));

	let mut carol = join(address, &room).await;
	assert_eq!(init_code(&mut carol).await, "x=1");
}

#[tokio::test]
async fn unknown_frames_are_relayed_verbatim() {
	let (address, rooms) = start_server().await;
	let room = create_room(address).await;

	let mut alice = join(address, &room).await;
	init_code(&mut alice).await;
	let mut bob = join(address, &room).await;
	init_code(&mut bob).await;

	let frame = r#"{"type":"cursor","offset":3}"#;
	send_text(&mut alice, frame).await;
	assert_eq!(next_text(&mut bob).await, frame);
	assert_eq!(rooms.code(&room).as_deref(), Some(""));
}

#[tokio::test]
async fn unknown_room_is_closed() {
	let (address, _) = start_server().await;
	let mut socket = join(address, &RoomId::from("missing")).await;

	let message = timeout(Duration::from_secs(2), socket.next()).await.unwrap();
	match message {
		None | Some(Ok(Message::Close(_)) | Err(_)) => {}
		Some(Ok(other)) => panic!("expected close, got {other:?}"),
	}
}

#[tokio::test]
async fn autocomplete_endpoint() {
	let (address, _) = start_server().await;
	let client = reqwest::Client::new();

	let ask = |code: &str, cursor_position: usize| {
		let request = SuggestionRequest {
			code: code.to_owned(),
			cursor_position,
			language: "python".to_owned(),
		};
		let client = client.clone();
		async move {
			client
				.post(format!("http://{address}/autocomplete"))
				.json(&request)
				.send()
				.await
				.unwrap()
				.json::<SuggestionResponse>()
				.await
				.unwrap()
		}
	};

	assert_eq!(ask("import", 6).await.suggestion.as_deref(), Some(" os"));
	assert_eq!(ask("x = 1", 5).await.suggestion, None);
}
