//! UseCase: 受信メッセージのルーティング
//!
//! クライアントの reader ループから呼ばれ、Envelope の `type` に応じて
//! ハンドラを振り分けます。各ハンドラは次のいずれかを行います:
//!
//! - 送信者へ直接返信する（pong, message_sent, chat_created など）
//! - Hub の購読状態を変更する（subscribe / unsubscribe）
//! - Hub にブロードキャストを依頼する（message_received, 既読, 入力中など）
//!
//! 未知の type やサーバー発行専用の type はログに残して破棄します。
//! メッセージ本体の永続化はこのユースケースの責務ではありません。

use std::sync::Arc;

use chathub_shared::time::Clock;
use serde_json::{Value, json};

use crate::{
    domain::{ChatId, ConnectionId, UserId},
    infrastructure::{
        dto::websocket::{Envelope, ErrorPayload, MessageType},
        hub::{HubHandle, Outbox},
    },
};

use super::error::RouteError;

/// The connection an inbound envelope arrived on
#[derive(Clone)]
pub struct ClientContext {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub outbox: Outbox,
}

impl ClientContext {
    /// Enqueue a direct reply for this connection
    pub fn reply(&self, envelope: &Envelope) -> Result<(), RouteError> {
        self.outbox.push_envelope(envelope)?;
        Ok(())
    }
}

/// メッセージルーティングのユースケース
pub struct RouteMessageUseCase {
    hub: HubHandle,
    clock: Arc<dyn Clock>,
}

impl RouteMessageUseCase {
    pub fn new(hub: HubHandle, clock: Arc<dyn Clock>) -> Self {
        Self { hub, clock }
    }

    /// Dispatch one inbound envelope
    pub async fn execute(
        &self,
        client: &ClientContext,
        envelope: Envelope,
    ) -> Result<(), RouteError> {
        tracing::debug!(
            connection_id = %client.connection_id,
            kind = ?envelope.r#type,
            "Routing envelope"
        );

        match envelope.r#type {
            MessageType::Ping => self.ping(client, envelope),
            MessageType::Pong => {
                self.hub.touch(&client.connection_id);
                Ok(())
            }
            MessageType::SubscribeChat => self.subscribe_chat(client, &envelope).await,
            MessageType::UnsubscribeChat => self.unsubscribe_chat(client, &envelope).await,
            MessageType::SubscribeUserChats => self.subscribe_user_chats(client, &envelope).await,
            MessageType::SendMessage => self.send_message(client, envelope).await,
            MessageType::MessageDelivered => self.receipt(client, envelope, "delivered_at").await,
            MessageType::MessageRead | MessageType::ChatRead => {
                self.receipt(client, envelope, "read_at").await
            }
            MessageType::UserTyping | MessageType::UserStoppedTyping => {
                self.relay(client, envelope, true).await
            }
            MessageType::ReactionAdded
            | MessageType::ReactionRemoved
            | MessageType::PinMessage
            | MessageType::UnpinMessage => self.relay(client, envelope, false).await,
            MessageType::CreateChat => self.create_chat(client, envelope),
            MessageType::UserOnline => self.presence(client, &envelope).await,
            other => {
                tracing::warn!(
                    connection_id = %client.connection_id,
                    kind = ?other,
                    server_originated = other.is_server_originated(),
                    "Dropping envelope clients may not send"
                );
                Ok(())
            }
        }
    }

    fn ping(&self, client: &ClientContext, envelope: Envelope) -> Result<(), RouteError> {
        let pong = Envelope::new(MessageType::Pong, json!({}), self.clock.now()).with_id(envelope.id);
        client.reply(&pong)?;
        self.hub.touch(&client.connection_id);
        Ok(())
    }

    async fn subscribe_chat(
        &self,
        client: &ClientContext,
        envelope: &Envelope,
    ) -> Result<(), RouteError> {
        let chat_id = required_chat_id(envelope)?;
        let added = self
            .hub
            .subscribe(&client.connection_id, vec![chat_id.clone()])
            .await?;
        tracing::info!(
            connection_id = %client.connection_id,
            chat_id = %chat_id,
            already_subscribed = added == 0,
            "Subscribed to chat"
        );
        Ok(())
    }

    async fn unsubscribe_chat(
        &self,
        client: &ClientContext,
        envelope: &Envelope,
    ) -> Result<(), RouteError> {
        let chat_id = required_chat_id(envelope)?;
        self.hub
            .unsubscribe(&client.connection_id, vec![chat_id.clone()])
            .await?;
        tracing::info!(
            connection_id = %client.connection_id,
            chat_id = %chat_id,
            "Unsubscribed from chat"
        );
        Ok(())
    }

    async fn subscribe_user_chats(
        &self,
        client: &ClientContext,
        envelope: &Envelope,
    ) -> Result<(), RouteError> {
        let raw_ids = envelope
            .data
            .get("chat_ids")
            .and_then(Value::as_array)
            .ok_or(RouteError::MissingField("chat_ids"))?;
        let chat_ids = raw_ids
            .iter()
            .map(|raw| parse_chat_id("chat_ids", raw))
            .collect::<Result<Vec<_>, _>>()?;

        let requested = chat_ids.len();
        let added = self.hub.subscribe(&client.connection_id, chat_ids).await?;
        tracing::info!(
            connection_id = %client.connection_id,
            requested,
            added,
            "Subscribed to user chats"
        );
        Ok(())
    }

    /// Local echo to the sender, fan-out to the rest of the chat
    async fn send_message(
        &self,
        client: &ClientContext,
        envelope: Envelope,
    ) -> Result<(), RouteError> {
        let chat_id = required_chat_id(&envelope)?;
        let now = self.clock.now();

        let mut sent = Envelope::new(MessageType::MessageSent, envelope.data.clone(), now)
            .with_id(envelope.id);
        sent.stamp([("sender_id", json!(client.user_id.as_str()))]);
        client.reply(&sent)?;

        let mut received = Envelope::new(MessageType::MessageReceived, envelope.data, now);
        received.stamp([("sender_id", json!(client.user_id.as_str()))]);
        self.hub
            .broadcast_to_chat(chat_id, received, Some(client.connection_id.clone()))
            .await?;
        Ok(())
    }

    /// Delivery / read receipts carry the server's clock, not the client's
    async fn receipt(
        &self,
        client: &ClientContext,
        mut envelope: Envelope,
        time_field: &'static str,
    ) -> Result<(), RouteError> {
        let chat_id = required_chat_id(&envelope)?;
        let now = self.clock.now();
        envelope.stamp([
            ("user_id", json!(client.user_id.as_str())),
            (time_field, json!(chathub_shared::time::to_rfc3339(now))),
        ]);
        envelope.timestamp = now;
        envelope.id = None;
        self.hub
            .broadcast_to_chat(chat_id, envelope, Some(client.connection_id.clone()))
            .await?;
        Ok(())
    }

    /// Stamp the acting user and re-broadcast to the chat
    async fn relay(
        &self,
        client: &ClientContext,
        mut envelope: Envelope,
        exclude_sender: bool,
    ) -> Result<(), RouteError> {
        let chat_id = required_chat_id(&envelope)?;
        envelope.stamp([("user_id", json!(client.user_id.as_str()))]);
        envelope.timestamp = self.clock.now();
        envelope.id = None;
        let exclude = exclude_sender.then(|| client.connection_id.clone());
        self.hub.broadcast_to_chat(chat_id, envelope, exclude).await?;
        Ok(())
    }

    fn create_chat(&self, client: &ClientContext, envelope: Envelope) -> Result<(), RouteError> {
        let mut created = Envelope::new(MessageType::ChatCreated, envelope.data, self.clock.now())
            .with_id(envelope.id);
        created.stamp([("created_by", json!(client.user_id.as_str()))]);
        client.reply(&created)
    }

    /// Answer a presence query for one user
    async fn presence(&self, client: &ClientContext, envelope: &Envelope) -> Result<(), RouteError> {
        let raw = envelope
            .data
            .get("user_id")
            .ok_or(RouteError::MissingField("user_id"))?;
        let user_id = UserId::new(id_string(raw).ok_or(RouteError::MissingField("user_id"))?)
            .map_err(|source| RouteError::InvalidField {
                field: "user_id",
                source,
            })?;

        let r#type = if self.hub.is_online(&user_id).await {
            MessageType::UserOnline
        } else {
            MessageType::UserOffline
        };
        let reply = Envelope::new(
            r#type,
            json!({ "user_id": user_id.as_str() }),
            self.clock.now(),
        )
        .with_id(envelope.id.clone());
        client.reply(&reply)
    }
}

/// Build the `error` envelope reported back to the sender
pub fn error_envelope(error: &RouteError, id: Option<String>, clock: &dyn Clock) -> Envelope {
    let payload = ErrorPayload {
        code: error.code(),
        message: error.to_string(),
    };
    let data = serde_json::to_value(&payload).unwrap_or(Value::Null);
    Envelope::new(MessageType::Error, data, clock.now()).with_id(id)
}

fn required_chat_id(envelope: &Envelope) -> Result<ChatId, RouteError> {
    let raw = envelope
        .data
        .get("chat_id")
        .ok_or(RouteError::MissingField("chat_id"))?;
    parse_chat_id("chat_id", raw)
}

fn parse_chat_id(field: &'static str, raw: &Value) -> Result<ChatId, RouteError> {
    let value = id_string(raw).ok_or(RouteError::MissingField(field))?;
    ChatId::new(value).map_err(|source| RouteError::InvalidField { field, source })
}

/// Identifiers may arrive as strings or as numeric database keys
fn id_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chathub_shared::time::FixedClock;

    use crate::{
        config::HubConfig,
        infrastructure::{
            dto::websocket::ErrorCode,
            hub::{ClientRegistration, Hub, OutboxReceiver, outbox},
            repository::InMemoryConnectionRepository,
        },
    };

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - type ごとのハンドラの振り分け
    // - 送信者への直接返信とチャットへのブロードキャストの宛先
    // - サーバー時刻・ユーザー ID のスタンプ
    // - 不正なペイロードでのエラー
    //
    // 【どのようなシナリオをテストするか】
    // 1. send_message: 送信者には message_sent、他の購読者には message_received
    // 2. 既読: サーバー時刻で上書きされる
    // 3. typing: 送信者を除外
    // 4. reaction: 送信者にも届く
    // 5. create_chat: 作成者にのみ返信
    // 6. chat_id 欠落・未知の type
    // ========================================

    const NOW_MILLIS: i64 = 1_700_000_000_000;

    struct Fixture {
        hub: HubHandle,
        usecase: RouteMessageUseCase,
        clock: Arc<FixedClock>,
    }

    struct TestClient {
        context: ClientContext,
        receiver: OutboxReceiver,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::from_millis(NOW_MILLIS));
        let (hub, handle) = Hub::new(
            &HubConfig::default(),
            Arc::new(InMemoryConnectionRepository::new()),
            clock.clone(),
        );
        tokio::spawn(hub.run());
        Fixture {
            usecase: RouteMessageUseCase::new(handle.clone(), clock.clone()),
            hub: handle,
            clock,
        }
    }

    async fn connect(hub: &HubHandle, user: &str) -> TestClient {
        let (outbox, mut receiver) = outbox(64);
        let user_id = UserId::new(user.to_string()).unwrap();
        let connection_id = hub
            .register(ClientRegistration {
                connection_id: None,
                user_id: user_id.clone(),
                socket_id: format!("{user}-socket"),
                outbox: outbox.clone(),
            })
            .await
            .unwrap();
        while receiver.try_next().is_some() {}
        TestClient {
            context: ClientContext {
                connection_id,
                user_id,
                outbox,
            },
            receiver,
        }
    }

    fn envelope(r#type: MessageType, data: Value) -> Envelope {
        Envelope::new(r#type, data, FixedClock::from_millis(0).now())
    }

    async fn next_of(receiver: &mut OutboxReceiver, r#type: MessageType) -> Envelope {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(1), receiver.next())
                .await
                .expect("timed out waiting for an envelope")
                .expect("outbox closed");
            let envelope = Envelope::from_json(&frame).unwrap();
            if envelope.r#type == r#type {
                return envelope;
            }
        }
    }

    /// Broadcasts are processed in order. Sends a marker to the observer and
    /// returns the types it received before the marker.
    async fn settle(fixture: &Fixture, observer: &mut TestClient) -> Vec<MessageType> {
        let marker = ChatId::new("__settle".to_string()).unwrap();
        fixture
            .hub
            .subscribe(&observer.context.connection_id, vec![marker.clone()])
            .await
            .unwrap();
        fixture
            .hub
            .broadcast_to_chat(
                marker,
                envelope(MessageType::ChatUpdated, json!({"marker": true})),
                None,
            )
            .await
            .unwrap();
        let mut seen = Vec::new();
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(1), observer.receiver.next())
                .await
                .expect("timed out waiting for the marker")
                .expect("outbox closed");
            let envelope = Envelope::from_json(&frame).unwrap();
            if envelope.r#type == MessageType::ChatUpdated {
                return seen;
            }
            seen.push(envelope.r#type);
        }
    }

    fn drained_types(receiver: &mut OutboxReceiver) -> Vec<MessageType> {
        let mut types = Vec::new();
        while let Some(frame) = receiver.try_next() {
            types.push(Envelope::from_json(&frame).unwrap().r#type);
        }
        types
    }

    async fn join(fixture: &Fixture, client: &TestClient, chat: &str) {
        fixture
            .usecase
            .execute(
                &client.context,
                envelope(MessageType::SubscribeChat, json!({"chat_id": chat})),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong_carrying_correlation_id() {
        // テスト項目: ping には同じ相関 ID を持つ pong が返る
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let ping = envelope(MessageType::Ping, Value::Null).with_id(Some("c-1".to_string()));

        // when (操作):
        fixture.usecase.execute(&alice.context, ping).await.unwrap();

        // then (期待する結果):
        let pong = next_of(&mut alice.receiver, MessageType::Pong).await;
        assert_eq!(pong.id.as_deref(), Some("c-1"));
        assert_eq!(pong.timestamp, fixture.clock.now());
    }

    #[tokio::test]
    async fn test_send_message_echoes_to_sender_and_fans_out_to_others() {
        // テスト項目: 送信者には message_sent、他の購読者には message_received が届く
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let mut bob = connect(&fixture.hub, "bob").await;
        join(&fixture, &alice, "room-7").await;
        join(&fixture, &bob, "room-7").await;
        drained_types(&mut alice.receiver);

        // when (操作):
        let message = envelope(
            MessageType::SendMessage,
            json!({"chat_id": "room-7", "text": "hello", "sender_id": "mallory"}),
        )
        .with_id(Some("m-1".to_string()));
        fixture.usecase.execute(&bob.context, message).await.unwrap();

        // then (期待する結果):
        let sent = next_of(&mut bob.receiver, MessageType::MessageSent).await;
        assert_eq!(sent.id.as_deref(), Some("m-1"));
        assert_eq!(sent.data_str("sender_id"), Some("bob"));

        let received = next_of(&mut alice.receiver, MessageType::MessageReceived).await;
        assert_eq!(received.data_str("text"), Some("hello"));
        assert_eq!(received.data_str("sender_id"), Some("bob"));
        assert_eq!(received.timestamp, fixture.clock.now());

        assert!(!settle(&fixture, &mut bob).await.contains(&MessageType::MessageReceived));
    }

    #[tokio::test]
    async fn test_send_message_without_chat_id_is_rejected() {
        // テスト項目: chat_id のない send_message は MissingField エラーになり、何も配信されない
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;

        // when (操作):
        let result = fixture
            .usecase
            .execute(
                &alice.context,
                envelope(MessageType::SendMessage, json!({"text": "lost"})),
            )
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(RouteError::MissingField("chat_id"))));
        assert!(drained_types(&mut alice.receiver).is_empty());
    }

    #[tokio::test]
    async fn test_numeric_chat_id_is_accepted() {
        // テスト項目: 数値の chat_id も受け付ける
        // given (前提条件):
        let fixture = fixture();
        let alice = connect(&fixture.hub, "alice").await;

        // when (操作):
        fixture
            .usecase
            .execute(
                &alice.context,
                envelope(MessageType::SubscribeChat, json!({"chat_id": 42})),
            )
            .await
            .unwrap();

        // then (期待する結果):
        let subscriptions = fixture
            .hub
            .subscriptions_of(&alice.context.connection_id)
            .await
            .unwrap();
        assert_eq!(subscriptions, vec![ChatId::new("42".to_string()).unwrap()]);
    }

    #[tokio::test]
    async fn test_read_receipt_is_stamped_with_server_time_and_reader() {
        // テスト項目: 既読通知はサーバー時刻と既読ユーザーで上書きされてブロードキャストされる
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let bob = connect(&fixture.hub, "bob").await;
        join(&fixture, &alice, "room-7").await;
        join(&fixture, &bob, "room-7").await;

        // when (操作):
        let receipt = envelope(
            MessageType::MessageRead,
            json!({"chat_id": "room-7", "message_id": "m-1", "read_at": "1999-01-01T00:00:00Z"}),
        );
        fixture.usecase.execute(&bob.context, receipt).await.unwrap();

        // then (期待する結果):
        let read = next_of(&mut alice.receiver, MessageType::MessageRead).await;
        assert_eq!(read.data_str("user_id"), Some("bob"));
        assert_eq!(read.data_str("message_id"), Some("m-1"));
        assert_eq!(
            read.data_str("read_at"),
            Some(chathub_shared::time::to_rfc3339(fixture.clock.now()).as_str())
        );
        assert_eq!(read.timestamp, fixture.clock.now());
    }

    #[tokio::test]
    async fn test_delivery_receipt_uses_delivered_at() {
        // テスト項目: 配信済み通知には delivered_at がスタンプされる
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let bob = connect(&fixture.hub, "bob").await;
        join(&fixture, &alice, "room-7").await;

        // when (操作):
        let receipt = envelope(
            MessageType::MessageDelivered,
            json!({"chat_id": "room-7", "message_id": "m-1"}),
        );
        fixture.usecase.execute(&bob.context, receipt).await.unwrap();

        // then (期待する結果):
        let delivered = next_of(&mut alice.receiver, MessageType::MessageDelivered).await;
        assert_eq!(delivered.data_str("user_id"), Some("bob"));
        assert!(delivered.data.get("delivered_at").is_some());
    }

    #[tokio::test]
    async fn test_typing_is_not_echoed_to_sender() {
        // テスト項目: 入力中通知は送信者自身には届かない
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let mut bob = connect(&fixture.hub, "bob").await;
        join(&fixture, &alice, "room-7").await;
        join(&fixture, &bob, "room-7").await;

        // when (操作):
        fixture
            .usecase
            .execute(
                &bob.context,
                envelope(MessageType::UserTyping, json!({"chat_id": "room-7"})),
            )
            .await
            .unwrap();

        // then (期待する結果):
        let typing = next_of(&mut alice.receiver, MessageType::UserTyping).await;
        assert_eq!(typing.data_str("user_id"), Some("bob"));
        assert!(!settle(&fixture, &mut bob).await.contains(&MessageType::UserTyping));
    }

    #[tokio::test]
    async fn test_reaction_reaches_the_whole_chat_including_sender() {
        // テスト項目: リアクションは送信者を含むチャット全体に届く
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let mut bob = connect(&fixture.hub, "bob").await;
        join(&fixture, &alice, "room-7").await;
        join(&fixture, &bob, "room-7").await;

        // when (操作):
        fixture
            .usecase
            .execute(
                &bob.context,
                envelope(
                    MessageType::ReactionAdded,
                    json!({"chat_id": "room-7", "message_id": "m-1", "emoji": "+1"}),
                ),
            )
            .await
            .unwrap();

        // then (期待する結果):
        let for_alice = next_of(&mut alice.receiver, MessageType::ReactionAdded).await;
        let for_bob = next_of(&mut bob.receiver, MessageType::ReactionAdded).await;
        assert_eq!(for_alice.data_str("user_id"), Some("bob"));
        assert_eq!(for_bob.data_str("emoji"), Some("+1"));
    }

    #[tokio::test]
    async fn test_create_chat_is_acknowledged_to_creator_only() {
        // テスト項目: create_chat の確認は作成者にだけ返る
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let mut bob = connect(&fixture.hub, "bob").await;

        // when (操作):
        fixture
            .usecase
            .execute(
                &alice.context,
                envelope(MessageType::CreateChat, json!({"name": "lunch"}))
                    .with_id(Some("c-9".to_string())),
            )
            .await
            .unwrap();

        // then (期待する結果):
        let created = next_of(&mut alice.receiver, MessageType::ChatCreated).await;
        assert_eq!(created.id.as_deref(), Some("c-9"));
        assert_eq!(created.data_str("created_by"), Some("alice"));
        assert_eq!(created.data_str("name"), Some("lunch"));
        assert!(!settle(&fixture, &mut bob).await.contains(&MessageType::ChatCreated));
    }

    #[tokio::test]
    async fn test_subscribe_user_chats_subscribes_every_listed_chat() {
        // テスト項目: subscribe_user_chats で列挙されたすべてのチャットを購読する
        // given (前提条件):
        let fixture = fixture();
        let alice = connect(&fixture.hub, "alice").await;

        // when (操作):
        fixture
            .usecase
            .execute(
                &alice.context,
                envelope(
                    MessageType::SubscribeUserChats,
                    json!({"chat_ids": ["room-8", "room-7", "room-7"]}),
                ),
            )
            .await
            .unwrap();

        // then (期待する結果):
        let subscriptions = fixture
            .hub
            .subscriptions_of(&alice.context.connection_id)
            .await
            .unwrap();
        let names: Vec<&str> = subscriptions.iter().map(ChatId::as_str).collect();
        assert_eq!(names, vec!["room-7", "room-8"]);
    }

    #[tokio::test]
    async fn test_subscribe_user_chats_with_invalid_entry_subscribes_nothing() {
        // テスト項目: 不正な chat_id を含む場合は何も購読されずエラーになる
        // given (前提条件):
        let fixture = fixture();
        let alice = connect(&fixture.hub, "alice").await;

        // when (操作):
        let result = fixture
            .usecase
            .execute(
                &alice.context,
                envelope(
                    MessageType::SubscribeUserChats,
                    json!({"chat_ids": ["room-7", "  "]}),
                ),
            )
            .await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(RouteError::InvalidField {
                field: "chat_ids",
                ..
            })
        ));
        let subscriptions = fixture
            .hub
            .subscriptions_of(&alice.context.connection_id)
            .await
            .unwrap();
        assert!(subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        // テスト項目: 購読解除後のブロードキャストは届かない
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let bob = connect(&fixture.hub, "bob").await;
        join(&fixture, &alice, "room-7").await;
        join(&fixture, &bob, "room-7").await;

        // when (操作):
        fixture
            .usecase
            .execute(
                &alice.context,
                envelope(MessageType::UnsubscribeChat, json!({"chat_id": "room-7"})),
            )
            .await
            .unwrap();
        fixture
            .usecase
            .execute(
                &bob.context,
                envelope(MessageType::SendMessage, json!({"chat_id": "room-7"})),
            )
            .await
            .unwrap();

        // then (期待する結果):
        assert!(!settle(&fixture, &mut alice).await.contains(&MessageType::MessageReceived));
    }

    #[tokio::test]
    async fn test_presence_query_reports_online_and_offline_users() {
        // テスト項目: プレゼンス問い合わせにオンライン / オフラインで返答する
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;
        let _bob = connect(&fixture.hub, "bob").await;
        drained_types(&mut alice.receiver);

        // when (操作):
        fixture
            .usecase
            .execute(
                &alice.context,
                envelope(MessageType::UserOnline, json!({"user_id": "bob"})),
            )
            .await
            .unwrap();
        fixture
            .usecase
            .execute(
                &alice.context,
                envelope(MessageType::UserOnline, json!({"user_id": "carol"})),
            )
            .await
            .unwrap();

        // then (期待する結果):
        let online = next_of(&mut alice.receiver, MessageType::UserOnline).await;
        assert_eq!(online.data_str("user_id"), Some("bob"));
        let offline = next_of(&mut alice.receiver, MessageType::UserOffline).await;
        assert_eq!(offline.data_str("user_id"), Some("carol"));
    }

    #[tokio::test]
    async fn test_unknown_and_server_originated_types_are_dropped() {
        // テスト項目: 未知の type とサーバー発行専用の type はエラーにならず破棄される
        // given (前提条件):
        let fixture = fixture();
        let mut alice = connect(&fixture.hub, "alice").await;

        // when (操作):
        let unknown = fixture
            .usecase
            .execute(&alice.context, envelope(MessageType::Unknown, json!({})))
            .await;
        let forged = fixture
            .usecase
            .execute(
                &alice.context,
                envelope(MessageType::UserOffline, json!({"user_id": "bob"})),
            )
            .await;

        // then (期待する結果):
        assert!(unknown.is_ok());
        assert!(forged.is_ok());
        assert!(drained_types(&mut alice.receiver).is_empty());
    }

    #[tokio::test]
    async fn test_error_envelope_carries_code_message_and_correlation_id() {
        // テスト項目: エラー Envelope にコード・メッセージ・相関 ID が入る
        // given (前提条件):
        let clock = FixedClock::from_millis(NOW_MILLIS);
        let error = RouteError::MissingField("chat_id");

        // when (操作):
        let envelope = error_envelope(&error, Some("c-3".to_string()), &clock);

        // then (期待する結果):
        assert_eq!(envelope.r#type, MessageType::Error);
        assert_eq!(envelope.id.as_deref(), Some("c-3"));
        let payload: ErrorPayload = serde_json::from_value(envelope.data).unwrap();
        assert_eq!(payload.code, ErrorCode::InvalidPayload);
        assert_eq!(payload.message, "missing field 'chat_id'");
    }
}
