mod common;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Duration, Utc};
use futures::{SinkExt, StreamExt};
use kivendi_common::MessageType;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

use common::{test_app, TestApp};
use kivendi_api::chat::{models::InboundFrame, SendOutcome};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn text(body: &str) -> InboundFrame {
    InboundFrame {
        message_type: MessageType::Text,
        text: Some(body.to_string()),
        offer_amount: None,
        images: Vec::new(),
    }
}

async fn message_count(pool: &sqlx::PgPool, conversation_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
        .bind(conversation_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn opening_twice_returns_the_same_conversation() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let token = app.user_token(buyer);

    let uri = format!("/ads/{}/conversations", ad);
    let (status, first) = app.request(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    let (_, second) = app.request(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(first["data"]["conversation_id"], second["data"]["conversation_id"]);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE ad_id = $1")
        .bind(ad)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn owner_cannot_chat_about_own_ad() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let token = app.user_token(seller);

    let (status, body) = app
        .request(Method::POST, &format!("/ads/{}/conversations", ad), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "SELF_CHAT");
}

#[tokio::test]
async fn unverified_buyer_cannot_open_conversation() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = common::create_user(&app.pool, false, false).await;
    let ad = app.create_ad(seller, true).await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/ads/{}/conversations", ad),
            Some(&app.user_token(buyer)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "ACCOUNT_UNVERIFIED");
}

#[tokio::test]
async fn blocking_drops_messages_and_hides_conversation() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let seller_token = app.user_token(seller);
    let buyer_token = app.user_token(buyer);

    let conversation = app.state.conversations.open_conversation(ad, buyer).await.unwrap();
    let outcome = app
        .state
        .conversations
        .send_message(&conversation, buyer, text("hi"))
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Delivered(_)));

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/conversations/{}/block", conversation.id),
            Some(&seller_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["blocked_by_me"], true);

    let (status, body) = app
        .request(Method::POST, &format!("/ads/{}/conversations", ad), Some(&buyer_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "BLOCKED");

    let outcome = app
        .state
        .conversations
        .send_message(&conversation, buyer, text("still there?"))
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Dropped));
    assert_eq!(message_count(&app.pool, conversation.id).await, 1);

    for token in [&seller_token, &buyer_token] {
        let (status, body) = app.request(Method::GET, "/conversations", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        let listed = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["id"] == conversation.id);
        assert!(!listed);
    }

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/conversations/{}/block-status", conversation.id),
            Some(&buyer_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["blocked_by_other"], true);
    assert_eq!(body["data"]["is_blocked"], true);

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/conversations/{}/unblock", conversation.id),
            Some(&seller_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let outcome = app
        .state
        .conversations
        .send_message(&conversation, buyer, text("back again"))
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Delivered(_)));
}

#[tokio::test]
async fn mark_read_only_flips_incoming_messages_once() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let ad = app.create_ad(seller, true).await;

    let conversation = app.state.conversations.open_conversation(ad, buyer).await.unwrap();
    for body in ["bonjour", "toujours dispo ?"] {
        app.state
            .conversations
            .send_message(&conversation, buyer, text(body))
            .await
            .unwrap();
    }
    app.state
        .conversations
        .send_message(&conversation, seller, text("oui"))
        .await
        .unwrap();

    let uri = format!("/conversations/{}/read", conversation.id);
    let seller_token = app.user_token(seller);
    let (status, body) = app.request(Method::POST, &uri, Some(&seller_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 2);

    let (_, body) = app.request(Method::POST, &uri, Some(&seller_token), None).await;
    assert_eq!(body["data"]["updated"], 0);

    let unread_for_buyer: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND sender_id = $2 AND NOT is_read",
    )
    .bind(conversation.id)
    .bind(seller)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(unread_for_buyer, 1);
}

#[tokio::test]
async fn outsiders_cannot_read_history() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let outsider = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let conversation = app.state.conversations.open_conversation(ad, buyer).await.unwrap();

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/conversations/{}/messages", conversation.id),
            Some(&app.user_token(outsider)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");
}

#[tokio::test]
async fn invalid_frames_are_refused_before_storage() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let conversation = app.state.conversations.open_conversation(ad, buyer).await.unwrap();

    let result = app
        .state
        .conversations
        .send_message(&conversation, buyer, text("   "))
        .await;
    assert!(matches!(result, Err(kivendi_common::AppError::Validation(_))));
    assert_eq!(message_count(&app.pool, conversation.id).await, 0);
}

#[tokio::test]
async fn report_is_stored_against_the_other_participant() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let conversation = app.state.conversations.open_conversation(ad, buyer).await.unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/conversations/{}/report", conversation.id),
            Some(&app.user_token(buyer)),
            Some(json!({ "reason": "asks for payment outside the app" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["reported_id"], seller);
    assert_eq!(body["data"]["status"], "pending");
}

async fn insert_message(
    app: &TestApp,
    conversation_id: i64,
    sender_id: i64,
    kind: &str,
    text: Option<&str>,
    offer_amount: Option<i64>,
    at: DateTime<Utc>,
) {
    let image_urls: Vec<String> = if kind == "image" {
        vec!["http://localhost/media/photo.png".to_string()]
    } else {
        Vec::new()
    };
    sqlx::query(
        r#"
        INSERT INTO messages (conversation_id, sender_id, message_type, text, offer_amount, image_urls, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(conversation_id)
    .bind(sender_id)
    .bind(kind)
    .bind(text)
    .bind(offer_amount.map(Decimal::from))
    .bind(image_urls)
    .bind(at)
    .execute(&app.pool)
    .await
    .unwrap();
}

async fn backdate(app: &TestApp, conversation_id: i64, at: DateTime<Utc>) {
    sqlx::query("UPDATE conversations SET created_at = $2 WHERE id = $1")
        .bind(conversation_id)
        .bind(at)
        .execute(&app.pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn listing_summarises_each_conversation() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let shop = app.create_user().await;
    sqlx::query("UPDATE users SET first_name = 'Awa', last_name = 'Koné' WHERE id = $1")
        .bind(buyer)
        .execute(&app.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE users SET account_type = 'professional', shop_name = 'Boutique Soleil' WHERE id = $1")
        .bind(shop)
        .execute(&app.pool)
        .await
        .unwrap();

    let now = Utc::now();
    let bike = app.create_ad(seller, true).await;
    let phone = app.create_ad(seller, true).await;
    let sofa = app.create_ad(seller, true).await;

    // old conversation, recent image
    let busy = app.state.conversations.open_conversation(bike, buyer).await.unwrap();
    backdate(&app, busy.id, now - Duration::hours(3)).await;
    insert_message(&app, busy.id, buyer, "text", Some("toujours dispo ?"), None, now - Duration::minutes(20)).await;
    insert_message(&app, busy.id, seller, "text", Some("oui"), None, now - Duration::minutes(15)).await;
    insert_message(&app, busy.id, buyer, "image", None, None, now - Duration::minutes(10)).await;

    // newer conversation whose only message predates it
    let offered = app.state.conversations.open_conversation(phone, shop).await.unwrap();
    backdate(&app, offered.id, now - Duration::hours(1)).await;
    insert_message(&app, offered.id, shop, "offer", None, Some(7500), now - Duration::minutes(90)).await;
    sqlx::query("UPDATE messages SET is_read = TRUE WHERE conversation_id = $1")
        .bind(offered.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let quiet = app.state.conversations.open_conversation(sofa, buyer).await.unwrap();
    backdate(&app, quiet.id, now - Duration::minutes(30)).await;

    let (status, body) = app
        .request(Method::GET, "/conversations", Some(&app.user_token(seller)), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let listed = body["data"].as_array().unwrap();
    let order: Vec<i64> = listed.iter().map(|c| c["id"].as_i64().unwrap()).collect();
    assert_eq!(order, vec![busy.id, quiet.id, offered.id]);

    assert_eq!(listed[0]["other_user_id"], buyer);
    assert_eq!(listed[0]["other_user_name"], "Awa Koné");
    assert_eq!(listed[0]["last_message"], "Image partagée");
    assert_eq!(listed[0]["unread_count"], 2);
    assert_eq!(listed[0]["ad_title"], "Vélo de ville");

    assert!(listed[1]["last_message"].is_null());
    assert_eq!(listed[1]["unread_count"], 0);

    assert_eq!(listed[2]["other_user_name"], "Boutique Soleil");
    assert_eq!(listed[2]["last_message"], "Offre: 7500 FCFA");
    assert_eq!(listed[2]["unread_count"], 0);

    let (_, body) = app
        .request(Method::GET, "/conversations", Some(&app.user_token(buyer)), None)
        .await;
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["id"], busy.id);
    assert_eq!(listed[0]["other_user_name"], "Test User");
    assert_eq!(listed[0]["unread_count"], 1);
}

async fn serve(app: &TestApp) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

async fn connect(addr: std::net::SocketAddr, conversation_id: i64, token: &str) -> Socket {
    let url = format!("ws://{}/ws/conversations/{}?token={}", addr, conversation_id, token);
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

/// Next JSON frame from the server, skipping control frames.
async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within 5s")
            .expect("socket ended")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_of_type(socket: &mut Socket, kind: &str) -> Value {
    loop {
        let frame = next_json(socket).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

async fn send_json(socket: &mut Socket, frame: Value) {
    socket.send(WsMessage::Text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn socket_session_delivers_refuses_and_drops_after_block() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let conversation = app.state.conversations.open_conversation(ad, buyer).await.unwrap();
    let addr = serve(&app).await;

    let mut seller_socket = connect(addr, conversation.id, &app.user_token(seller)).await;
    let mut buyer_socket = connect(addr, conversation.id, &app.user_token(buyer)).await;
    for _ in 0..100 {
        if app.state.hub.subscriber_count(conversation.id).await == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(app.state.hub.subscriber_count(conversation.id).await, 2);

    send_json(&mut buyer_socket, json!({ "type": "text", "text": "salut" })).await;
    let received = next_of_type(&mut seller_socket, "text").await;
    assert_eq!(received["text"], "salut");
    assert_eq!(received["sender_id"], buyer);
    assert_eq!(received["conversation_id"], conversation.id);

    send_json(&mut buyer_socket, json!({ "type": "offer" })).await;
    let error = next_of_type(&mut buyer_socket, "error").await;
    assert_eq!(error["error"], "VALIDATION_ERROR");
    assert_eq!(message_count(&app.pool, conversation.id).await, 1);

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/conversations/{}/block", conversation.id),
            Some(&app.user_token(seller)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // the socket stays open; its frames are dropped from now on
    send_json(&mut buyer_socket, json!({ "type": "text", "text": "encore là ?" })).await;
    buyer_socket.send(WsMessage::Text("pas du json".to_string())).await.unwrap();
    let error = next_of_type(&mut buyer_socket, "error").await;
    assert_eq!(error["error"], "VALIDATION_ERROR");
    assert_eq!(message_count(&app.pool, conversation.id).await, 1);

    buyer_socket.close(None).await.unwrap();
    seller_socket.close(None).await.unwrap();
}

#[tokio::test]
async fn socket_for_an_outsider_is_refused() {
    let Some(app) = test_app().await else { return };
    let seller = app.create_user().await;
    let buyer = app.create_user().await;
    let outsider = app.create_user().await;
    let ad = app.create_ad(seller, true).await;
    let conversation = app.state.conversations.open_conversation(ad, buyer).await.unwrap();
    let addr = serve(&app).await;

    let url = format!(
        "ws://{}/ws/conversations/{}?token={}",
        addr,
        conversation.id,
        app.user_token(outsider)
    );
    let refused = connect_async(url).await;
    assert!(refused.is_err());
    assert_eq!(app.state.hub.subscriber_count(conversation.id).await, 0);
}
