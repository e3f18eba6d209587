use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::{json, Value};

use tally_core::{ParticipantBinding, RetryPolicy, TrackedParticipants, UserId};
use tally_counter::{
    CounterBot, CounterBotConfig, CounterError, CounterStore, DispatchOutcome, RenderOutcome,
};
use tally_ledger::{Ledger, PostgrestLedger, PostgrestLedgerConfig, SqliteLedger};
use tally_telegram::{parse_update, TelegramApiClient, TelegramClientConfig};

const FRIEND_ID: i64 = 424_546_089;
const ME_ID: i64 = 1_181_433_072;
const CHAT_ID: i64 = -1_001_234_567_890;
const THREAD_ID: i64 = 7;
/// 2024-01-01T12:00:00Z
const NOON_2024_01_01: i64 = 1_704_110_400;

fn participants() -> TrackedParticipants {
    TrackedParticipants::new(
        ParticipantBinding {
            user_id: UserId(FRIEND_ID),
            label: "Friend".to_string(),
        },
        ParticipantBinding {
            user_id: UserId(ME_ID),
            label: "Me".to_string(),
        },
    )
}

fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
}

fn telegram_client(server: &MockServer) -> Arc<TelegramApiClient> {
    Arc::new(
        TelegramApiClient::new(TelegramClientConfig {
            api_base: server.base_url(),
            bot_token: "integration-token".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("telegram client"),
    )
}

fn mock_bot_api(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/botintegration-token/sendMessage");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 777}}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/botintegration-token/editMessageText");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 777}}));
    });
}

async fn build_bot(ledger: Arc<dyn Ledger>, server: &MockServer) -> Arc<CounterBot> {
    let store = Arc::new(CounterStore::new(ledger, participants()));
    store.hydrate().await.expect("hydrate");
    bot_over(store, server)
}

fn bot_over(store: Arc<CounterStore>, server: &MockServer) -> Arc<CounterBot> {
    let config = CounterBotConfig {
        bot_username: Some("tally_bot".to_string()),
        render_policy: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
        ..CounterBotConfig::default()
    };
    Arc::new(CounterBot::new(config, store, telegram_client(server)))
}

fn update(update_id: i64, author: i64, text: &str) -> Value {
    let mut raw = json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "message_thread_id": THREAD_ID,
            "is_topic_message": true,
            "from": {"id": author, "is_bot": false, "first_name": "someone"},
            "chat": {"id": CHAT_ID, "type": "supergroup", "is_forum": true},
            "date": NOON_2024_01_01,
            "text": text
        }
    });
    if text.starts_with('/') {
        let length = text.split_whitespace().next().map_or(0, str::len);
        raw["message"]["entities"] = json!([{"type": "bot_command", "offset": 0, "length": length}]);
    }
    raw
}

fn photo_update(update_id: i64, author: i64) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "message_thread_id": THREAD_ID,
            "is_topic_message": true,
            "from": {"id": author, "is_bot": false, "first_name": "someone"},
            "chat": {"id": CHAT_ID, "type": "supergroup", "is_forum": true},
            "date": NOON_2024_01_01,
            "photo": [{"file_id": "photo", "file_unique_id": "p", "width": 1, "height": 1}]
        }
    })
}

async fn dispatch(bot: &CounterBot, raw: Value) -> DispatchOutcome {
    let message = parse_update(&raw)
        .expect("valid update")
        .expect("message update");
    bot.handle_message(message).await
}

fn sqlite_ledger(dir: &Path) -> Arc<SqliteLedger> {
    Arc::new(SqliteLedger::new(dir.join("ledger.sqlite")).expect("sqlite ledger"))
}

#[tokio::test]
async fn integration_tracking_flow_persists_counts_across_restart() {
    let server = MockServer::start();
    mock_bot_api(&server);
    let temp = tempfile::tempdir().expect("tempdir");

    {
        let bot = build_bot(sqlite_ledger(temp.path()), &server).await;
        assert_eq!(
            dispatch(&bot, update(1, FRIEND_ID, "hello before start")).await,
            DispatchOutcome::Ignored {
                reason: "no_active_thread"
            }
        );
        assert_eq!(
            dispatch(&bot, update(2, ME_ID, "/start_actions@tally_bot")).await,
            DispatchOutcome::Command {
                name: "start_tracking",
                succeeded: true
            }
        );
        for (update_id, author) in [(3, FRIEND_ID), (4, ME_ID), (5, FRIEND_ID)] {
            assert!(matches!(
                dispatch(&bot, update(update_id, author, "message")).await,
                DispatchOutcome::Counted { .. }
            ));
        }
        assert_eq!(
            dispatch(&bot, update(6, 55, "outsider")).await,
            DispatchOutcome::Ignored {
                reason: "untracked_author"
            }
        );
        assert_eq!(
            dispatch(&bot, photo_update(7, FRIEND_ID)).await,
            DispatchOutcome::Ignored {
                reason: "not_content"
            }
        );
        assert!(matches!(
            dispatch(&bot, update(8, ME_ID, "second message")).await,
            DispatchOutcome::Counted { .. }
        ));
        let snapshot = bot.store().snapshot().await;
        assert_eq!((snapshot.count_a, snapshot.count_b), (2, 2));
    }

    let restarted = build_bot(sqlite_ledger(temp.path()), &server).await;
    let snapshot = restarted.store().snapshot().await;
    assert_eq!((snapshot.count_a, snapshot.count_b), (2, 2));
    assert_eq!(snapshot.active_thread, None);

    let ledger = sqlite_ledger(temp.path());
    assert_eq!(
        ledger
            .get(UserId(FRIEND_ID), day("2024-01-01"))
            .await
            .expect("get"),
        Some(2)
    );
}

#[tokio::test]
async fn integration_concurrent_deliveries_keep_ledger_and_control_in_sync() {
    let server = MockServer::start();
    mock_bot_api(&server);
    let temp = tempfile::tempdir().expect("tempdir");
    let ledger = sqlite_ledger(temp.path());
    let bot = build_bot(ledger.clone(), &server).await;
    dispatch(&bot, update(1, ME_ID, "/start_actions")).await;

    let mut handles = Vec::new();
    for index in 0..20_i64 {
        let bot = bot.clone();
        let author = if index % 5 < 3 { FRIEND_ID } else { ME_ID };
        handles.push(tokio::spawn(async move {
            dispatch(&bot, update(100 + index, author, "burst")).await
        }));
    }
    // Redeliver a few of the same updates.
    for index in 0..4_i64 {
        let bot = bot.clone();
        let author = if index % 5 < 3 { FRIEND_ID } else { ME_ID };
        handles.push(tokio::spawn(async move {
            dispatch(&bot, update(100 + index, author, "burst")).await
        }));
    }
    for handle in handles {
        handle.await.expect("join");
    }

    let snapshot = bot.store().snapshot().await;
    assert_eq!((snapshot.count_a, snapshot.count_b), (12, 8));
    let rows = ledger
        .scan(tally_core::DayRange::all())
        .await
        .expect("scan");
    let total: i64 = rows.iter().map(|row| row.count).sum();
    assert_eq!(total, 20);
    // The last completed render already shows the final snapshot.
    assert_eq!(bot.display().render().await, RenderOutcome::Unchanged);
}

#[tokio::test]
async fn regression_unreachable_ledger_makes_hydration_fail() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/v1/actions");
        then.status(503).body("maintenance");
    });
    let ledger = PostgrestLedger::new(PostgrestLedgerConfig {
        base_url: server.base_url(),
        api_key: "service-key".to_string(),
        ..PostgrestLedgerConfig::default()
    })
    .expect("ledger");
    let store = CounterStore::new(Arc::new(ledger), participants());
    assert!(matches!(
        store.hydrate().await,
        Err(CounterError::Hydrate { .. })
    ));
}

#[tokio::test]
async fn functional_report_command_reads_postgrest_window() {
    let server = MockServer::start();
    let scan = server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/actions")
            .query_param("date", "gte.2023-12-01")
            .query_param("date", "lte.2023-12-31");
        then.status(200).json_body(json!([
            {"user_id": FRIEND_ID, "date": "2023-12-30", "count": 4},
            {"user_id": ME_ID, "date": "2023-12-31", "count": 6}
        ]));
    });
    let report_reply = server.mock(|when, then| {
        when.method(POST)
            .path("/botintegration-token/sendMessage")
            .body_includes("Total: Friend 4, Me 6");
        then.status(200)
            .json_body(json!({"ok": true, "result": {"message_id": 778}}));
    });

    let ledger = PostgrestLedger::new(PostgrestLedgerConfig {
        base_url: server.base_url(),
        api_key: "service-key".to_string(),
        ..PostgrestLedgerConfig::default()
    })
    .expect("ledger");
    let store = Arc::new(CounterStore::new(Arc::new(ledger), participants()));
    let bot = bot_over(store, &server);

    let outcome = dispatch(&bot, update(9, ME_ID, "/stats_counter 2023-12-01 2023-12-31")).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Command {
            name: "report",
            succeeded: true
        }
    );
    scan.assert_calls(1);
    report_reply.assert_calls(1);
}
