//! Integration tests: the client library against an in-process relay
//! server on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use agora_client::api::{ApiClient, ws_endpoint};
use agora_client::chat::{ChatEvent, LiveChat, SessionKey};
use agora_client::orders::{OrderFeed, RoleScope};
use agora_client::socket::{ConnectionManager, LinkState, ManagerConfig};
use agora_server::state::AppState;
use agora_server::store::OrderRecord;
use agora_shared::frame::ServerFrame;
use agora_shared::model::{
    Identity, MarkReadBody, OrderSnapshot, OrderStatus, UpdateOrderStatusBody, UserRole,
};

/// In-process relay server bound to an ephemeral port.
struct TestServer {
    state: Arc<AppState>,
    addr: std::net::SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let state = agora_server::build_state();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let serve_state = state.clone();
        let handle = tokio::spawn(async move {
            let _ = agora_server::serve_on(listener, serve_state).await;
        });
        TestServer {
            state,
            addr,
            handle,
        }
    }

    fn http_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Manager config with test-friendly timings.
    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            endpoint: ws_endpoint(&self.http_base()),
            reconnect_delay: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(2),
            debounce_window: Duration::from_millis(50),
        }
    }

    fn api(&self) -> ApiClient {
        ApiClient::new(self.http_base()).with_bearer("test-token")
    }

    /// Connected-client count as reported by the debug endpoint.
    async fn client_count(&self) -> usize {
        let url = format!("{}/debug/clients", self.http_base());
        let value: serde_json::Value = reqwest::get(&url)
            .await
            .expect("debug/clients request")
            .json()
            .await
            .expect("debug/clients body");
        value["count"].as_u64().unwrap_or(0) as usize
    }

    async fn kick_all(&self) {
        let url = format!("{}/debug/kick", self.http_base());
        reqwest::Client::new()
            .post(&url)
            .send()
            .await
            .expect("debug/kick request");
    }

    async fn seed_order(&self, order_id: &str, customer_id: &str, shop_id: &str) {
        self.state.store.lock().await.seed_order(OrderRecord {
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
            shop_id: shop_id.to_string(),
            status: OrderStatus::Pending,
            snapshot: OrderSnapshot {
                product_name: "Sourdough loaf".to_string(),
                shop_name: "Corner Bakery".to_string(),
                quantity: 1,
                unit_price: 650,
            },
        });
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Poll an async condition until it holds or ~2 seconds pass.
macro_rules! eventually {
    ($cond:expr) => {{
        let mut ok = false;
        for _ in 0..100 {
            if $cond {
                ok = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        ok
    }};
}

#[tokio::test]
async fn test_singleton_connection_shared_by_subscribers() {
    // given: three subscribers on one manager
    let server = TestServer::start().await;
    let manager = ConnectionManager::new(server.manager_config());
    let sub_a = manager.subscribe();
    let sub_b = manager.subscribe();
    let sub_c = manager.subscribe();

    // when:
    manager
        .connect(Identity::customer("c1"))
        .await
        .expect("connect");

    // then: exactly one transport connection exists
    assert!(eventually!(server.client_count().await == 1));

    // when: all but one subscriber unmounts
    drop(sub_a);
    drop(sub_b);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // then: the connection stays open
    assert_eq!(server.client_count().await, 1);
    assert!(manager.watch_state().borrow().is_open());

    // when: the last subscriber unmounts
    drop(sub_c);

    // then: the connection closes and the manager comes to rest
    assert!(eventually!(server.client_count().await == 0));
    assert!(eventually!(matches!(
        *manager.watch_state().borrow(),
        LinkState::Idle
    )));
}

#[tokio::test]
async fn test_customer_send_reaches_merchant_and_updates_threads() {
    // given: a customer conversation and a connected merchant
    let server = TestServer::start().await;
    let api = server.api();

    let customer_mgr = ConnectionManager::new(server.manager_config());
    customer_mgr
        .connect(Identity::customer("c1"))
        .await
        .expect("customer connect");
    let (live, mut events) = LiveChat::open(
        customer_mgr.clone(),
        api.clone(),
        Identity::customer("c1"),
        SessionKey::new("c1", "s1"),
    )
    .await
    .expect("open chat");

    let merchant_mgr = ConnectionManager::new(server.manager_config());
    merchant_mgr
        .connect(Identity::merchant("m1", "s1"))
        .await
        .expect("merchant connect");
    let mut merchant_sub = merchant_mgr.subscribe();

    // when: the customer sends through the optimistic pipeline
    let confirmed = live.send("Hello").await.expect("send");

    // then: the confirmed entry carries a server id
    assert!(!confirmed.id.starts_with("temp_"));
    assert_eq!(confirmed.sender_id, "c1");
    assert_eq!(confirmed.sender_type, UserRole::Customer);

    // and the first event was the staged temp entry
    match events.recv().await.expect("staged event") {
        ChatEvent::MessageStaged(staged) => {
            assert!(staged.id.starts_with("temp_"));
            assert_eq!(staged.body, "Hello");
        }
        other => panic!("expected staged event, got {:?}", other),
    }

    // and the thread converges to exactly one entry under the server id,
    // no matter how the echo and the confirmation interleaved
    assert!(eventually!({
        let messages = live.messages();
        messages.len() == 1 && messages[0].id == confirmed.id
    }));

    // and the merchant receives the broadcast
    let payload = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match merchant_sub.recv().await {
                Some(ServerFrame::MessageReceived { payload }) => break payload,
                Some(_) => continue,
                None => panic!("merchant subscription ended"),
            }
        }
    })
    .await
    .expect("merchant broadcast");
    assert_eq!(payload.body, "Hello");
    assert_eq!(payload.id, confirmed.id);

    // and the merchant's thread list shows one unread conversation
    let threads = api.fetch_threads("m1", Some("s1")).await.expect("threads");
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].customer_id, "c1");
    assert_eq!(threads[0].unread_count, 1);

    // when: the merchant marks the thread read
    api.mark_read(&MarkReadBody {
        customer_id: "c1".to_string(),
        shop_id: "s1".to_string(),
        reader_id: "m1".to_string(),
    })
    .await
    .expect("mark read");

    // then: the unread count drops to zero
    let threads = api.fetch_threads("m1", Some("s1")).await.expect("threads");
    assert_eq!(threads[0].unread_count, 0);

    // and the customer's copy flips to read via the broadcast
    assert!(eventually!(live.messages()[0].read));
}

#[tokio::test]
async fn test_reconnect_after_abrupt_close() {
    // given: a connected manager with one subscriber
    let server = TestServer::start().await;
    let manager = ConnectionManager::new(server.manager_config());
    let mut sub = manager.subscribe();
    manager
        .connect(Identity::customer("c1"))
        .await
        .expect("connect");
    assert!(eventually!(server.client_count().await == 1));

    // when: the server drops the connection without a close handshake
    server.kick_all().await;
    assert_eq!(server.client_count().await, 0);

    // then: the manager reconnects and re-authenticates on its own; the
    // relay only registers clients whose auth frame it has seen
    assert!(eventually!(server.client_count().await == 1));
    assert!(eventually!(manager.watch_state().borrow().is_open()));

    // and broadcasts resume without a manual reload
    let api = server.api();
    let body = agora_shared::model::PostMessageBody {
        customer_id: "c1".to_string(),
        shop_id: "s1".to_string(),
        product_id: None,
        sender_id: "c1".to_string(),
        sender_type: UserRole::Customer,
        message: "still here?".to_string(),
        client_key: None,
    };
    api.post_message(&body).await.expect("post after reconnect");

    let payload = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match sub.recv().await {
                Some(ServerFrame::MessageReceived { payload }) => break payload,
                Some(_) => continue, // the transport error frame, auth_ok, ...
                None => panic!("subscription ended"),
            }
        }
    })
    .await
    .expect("broadcast after reconnect");
    assert_eq!(payload.body, "still here?");
}

#[tokio::test]
async fn test_order_updates_filtered_by_role() {
    // given: an order at shop s1 for customer c1, and four dashboards
    let server = TestServer::start().await;
    server.seed_order("o1", "c1", "s1").await;

    let owning_merchant = ConnectionManager::new(server.manager_config());
    owning_merchant
        .connect(Identity::merchant("m1", "s1"))
        .await
        .expect("merchant s1 connect");
    let (_feed_s1, mut rx_s1) = OrderFeed::attach(
        &owning_merchant,
        RoleScope::Merchant {
            shop_id: "s1".to_string(),
        },
    );

    let other_merchant = ConnectionManager::new(server.manager_config());
    other_merchant
        .connect(Identity::merchant("m2", "s2"))
        .await
        .expect("merchant s2 connect");
    let (_feed_s2, mut rx_s2) = OrderFeed::attach(
        &other_merchant,
        RoleScope::Merchant {
            shop_id: "s2".to_string(),
        },
    );

    let customer = ConnectionManager::new(server.manager_config());
    customer
        .connect(Identity::customer("c1"))
        .await
        .expect("customer connect");
    let (_feed_c1, mut rx_c1) = OrderFeed::attach(
        &customer,
        RoleScope::Customer {
            customer_id: "c1".to_string(),
        },
    );

    let admin = ConnectionManager::new(server.manager_config());
    admin
        .connect(Identity::admin("a1"))
        .await
        .expect("admin connect");
    let (_feed_admin, mut rx_admin) = OrderFeed::attach(&admin, RoleScope::Admin);

    assert!(eventually!(server.client_count().await == 4));

    // when: the order advances
    let api = server.api();
    let update = api
        .update_order_status(
            "o1",
            &UpdateOrderStatusBody {
                new_status: OrderStatus::InProgress,
            },
        )
        .await
        .expect("advance order");
    assert_eq!(update.previous_status, OrderStatus::Pending);

    // then: the owning merchant, the order's customer, and the admin all
    // receive it
    for rx in [&mut rx_s1, &mut rx_c1, &mut rx_admin] {
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("order update timely")
            .expect("order update present");
        assert_eq!(received.order_id, "o1");
        assert_eq!(received.new_status, OrderStatus::InProgress);
    }

    // and the unrelated merchant's feed stays silent
    let silent = tokio::time::timeout(Duration::from_millis(300), rx_s2.recv()).await;
    assert!(silent.is_err(), "unrelated merchant must not see the update");
}

#[tokio::test]
async fn test_force_reconnect_cycles_the_connection() {
    // given: a connected manager
    let server = TestServer::start().await;
    let manager = ConnectionManager::new(server.manager_config());
    let _sub = manager.subscribe();
    manager
        .connect(Identity::customer("c1"))
        .await
        .expect("connect");
    assert!(eventually!(server.client_count().await == 1));

    // when: the caller forces a fresh connection
    manager.force_reconnect().await;

    // then: the manager dials again without waiting for the reconnect
    // delay and ends up open and registered
    assert!(eventually!(manager.watch_state().borrow().is_open()));
    assert!(eventually!(server.client_count().await == 1));
}

#[tokio::test]
async fn test_merchant_without_shop_is_rejected_and_not_retried() {
    // given: a merchant identity missing its shop id
    let server = TestServer::start().await;
    let manager = ConnectionManager::new(server.manager_config());
    let mut sub = manager.subscribe();
    let broken = Identity {
        user_id: "m1".to_string(),
        role: UserRole::Merchant,
        shop_id: None,
    };

    // when: the transport opens but auth is rejected
    let _ = manager.connect(broken).await;

    // then: the rejection reaches subscribers as a typed frame
    let reason = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match sub.recv().await {
                Some(ServerFrame::AuthFailed { reason }) => break reason,
                Some(_) => continue,
                None => panic!("subscription ended"),
            }
        }
    })
    .await
    .expect("auth_failed frame");
    assert!(reason.contains("shop_id"));

    // and the manager gives up instead of redialing with bad credentials:
    // the supervisor retires to Idle and stays there
    assert!(eventually!(matches!(
        *manager.watch_state().borrow(),
        LinkState::Idle
    )));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(matches!(*manager.watch_state().borrow(), LinkState::Idle));
    assert_eq!(server.client_count().await, 0);
}

#[tokio::test]
async fn test_message_read_frame_updates_peer_view() {
    // given: both sides of one conversation are online
    let server = TestServer::start().await;
    let api = server.api();

    let customer_mgr = ConnectionManager::new(server.manager_config());
    customer_mgr
        .connect(Identity::customer("c1"))
        .await
        .expect("customer connect");
    let (customer_live, _customer_events) = LiveChat::open(
        customer_mgr.clone(),
        api.clone(),
        Identity::customer("c1"),
        SessionKey::new("c1", "s1"),
    )
    .await
    .expect("customer chat");

    let confirmed = customer_live.send("Is my order ready?").await.expect("send");

    let merchant_mgr = ConnectionManager::new(server.manager_config());
    merchant_mgr
        .connect(Identity::merchant("m1", "s1"))
        .await
        .expect("merchant connect");
    let (merchant_live, _merchant_events) = LiveChat::open(
        merchant_mgr.clone(),
        api,
        Identity::merchant("m1", "s1"),
        SessionKey::new("c1", "s1"),
    )
    .await
    .expect("merchant chat");

    // the merchant's history fetch already contains the message
    assert_eq!(merchant_live.messages().len(), 1);

    // when: the merchant reports the message as viewed over the socket
    assert!(merchant_live.mark_read(&confirmed.id));

    // then: the customer's copy flips to read via the broadcast
    assert!(eventually!(customer_live.messages()[0].read));
}
