//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! either with a raw `tokio-tungstenite` client or with our own
//! [`WebSocketConnector`].

#[cfg(feature = "websocket")]
mod websocket {
    use chatwire_transport::{
        Connection, Connector, Transport, WebSocketConnector, WebSocketTransport,
    };
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;

    async fn bind() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let (mut client_ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.expect("task should complete");
        assert!(server_conn.id().into_inner() > 0);

        server_conn
            .send(b"hello from server")
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello from server");

        client_ws
            .send(Message::Binary(b"hello from client".to_vec().into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let (mut client_ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_connector_forwards_credential_as_bearer_header() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}/api/ws"));
        let client_conn = connector.connect("tok-123").await.expect("should connect");
        let server_conn = server_handle.await.unwrap();

        assert_eq!(server_conn.credential(), Some("tok-123"));
        assert_eq!(client_conn.credential(), None);
    }

    #[tokio::test]
    async fn test_accept_reads_token_query_parameter() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let (_client_ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?x=1&token=abc"))
                .await
                .expect("client should connect");
        let server_conn = server_handle.await.unwrap();

        assert_eq!(server_conn.credential(), Some("abc"));
    }

    #[tokio::test]
    async fn test_connector_frames_round_trip_both_ways() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}"));
        let client = connector.connect("t").await.expect("should connect");
        let server = server_handle.await.unwrap();

        client.send(&[0, 0]).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), vec![0, 0]);

        server.send(&[0, 2, 1]).await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), vec![0, 2, 1]);

        client.close().await.unwrap();
        assert!(server.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connector_reports_refused_connection() {
        // Bind then drop so the port is (very likely) closed.
        let (transport, addr) = bind().await;
        drop(transport);

        let connector = WebSocketConnector::new(format!("ws://{addr}"));
        let result = connector.connect("t").await;
        assert!(matches!(
            result,
            Err(chatwire_transport::TransportError::ConnectFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_socket_does_not_block_later_accepts() {
        let (mut transport, addr) = bind().await;
        let _silent = TcpStream::connect(&addr).await.expect("tcp connect");

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}"));
        let client = tokio::time::timeout(Duration::from_secs(2), connector.connect("late"))
            .await
            .expect("upgrade should not wait behind the silent socket")
            .expect("should connect");
        let server = server_handle.await.unwrap();

        assert_eq!(server.credential(), Some("late"));
        client.send(&[0, 0]).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_upgrade_timeout_drops_silent_socket() {
        let (transport, addr) = bind().await;
        let mut transport = transport.with_handshake_timeout(Duration::from_millis(100));
        tokio::spawn(async move {
            let _ = transport.accept().await;
        });

        let mut silent = TcpStream::connect(&addr).await.expect("tcp connect");
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
            .await
            .expect("server should hang up on the silent socket");
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
