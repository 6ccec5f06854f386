//! End-to-end runs of streamer, ingestion and store against a scripted chain
//!
//! Key integration points tested:
//! - Gap backfill feeding the coordinator in block order
//! - Wallet, token and pattern state persisted to an on-disk store
//! - Restart from the stored cursor
//! - Read-only reporting connections next to the writer

mod common;

use cexflow::pipeline::{
    start_pipeline_ingestion, Coordinator, EngineSettings, ExchangeSet, IngestionStats,
};
use cexflow::seed::{load_exchanges_file, seed_exchanges};
use cexflow::store::{
    all, peek, put, Account, BlockCursor, Exchange, Pattern, Store, Swap, Token,
};
use cexflow::streamer_core::{BlockBatch, BlockStreamer, StreamStats, StreamerSettings};
use common::*;
use ethers::types::{Address, U256};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, NamedTempFile};
use tokio::sync::{mpsc, oneshot};

fn settings() -> StreamerSettings {
    StreamerSettings {
        fetch_timeout: Duration::from_secs(1),
        reconnect_initial_delay: Duration::ZERO,
        reconnect_max_delay: Duration::ZERO,
        reconnect_max_retries: 3,
        enable_backfill: true,
        max_backfill_blocks: 16,
    }
}

fn open_seeded(db_path: &Path) -> Store {
    let mut seed = NamedTempFile::new().unwrap();
    write!(
        seed,
        r#"[{{"name": "Binance 14", "address": "{:?}"}}]"#,
        exchange()
    )
    .unwrap();

    let mut store = Store::open(db_path).unwrap();
    let exchanges = load_exchanges_file(seed.path()).unwrap();
    seed_exchanges(&mut store, &exchanges).unwrap();
    store
}

/// Run streamer and ingestion until `scripted` header streams are consumed
async fn run_pipeline(
    chain: Arc<FixtureChain>,
    store: Store,
    scripted: usize,
) -> (StreamStats, IngestionStats) {
    let baseline = chain.subscribe_calls.load(Ordering::SeqCst);
    let exchanges = ExchangeSet::load(store.connection()).unwrap();
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(Mutex::new(store)),
        chain.clone(),
        Arc::new(exchanges),
        EngineSettings::default(),
    ));
    let resume_from = coordinator
        .last_processed()
        .unwrap()
        .map(|cursor| cursor.number + 1);

    let (tx, rx) = mpsc::channel::<BlockBatch>(1);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let ingestion = tokio::spawn(start_pipeline_ingestion(rx, coordinator));
    let streamer = tokio::spawn(
        BlockStreamer::new(chain.clone(), tx, settings(), resume_from).run(async {
            let _ = stop_rx.await;
        }),
    );

    tokio::time::timeout(
        Duration::from_secs(5),
        chain.wait_for_subscriptions(baseline + scripted + 1),
    )
    .await
    .expect("scripted headers were not consumed");
    stop_tx.send(()).unwrap();

    let stream_stats = streamer.await.unwrap().unwrap();
    let ingestion_stats = ingestion.await.unwrap().unwrap();
    (stream_stats, ingestion_stats)
}

#[tokio::test]
async fn test_transfer_and_swap_persisted_through_backfill() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cexflow.db");
    let store = open_seeded(&db_path);

    let chain = Arc::new(FixtureChain::new());
    let first = chain.add_block(1, vec![tx(exchange(), wallet(), eth(5), vec![])]);
    chain.add_block(
        2,
        vec![tx(wallet(), router(), eth(2), swap_input(&[weth(), token()]))],
    );
    let third = chain.add_block(3, vec![]);
    // Block 2 never gets a header and must be backfilled
    chain.script_subscription(vec![first, third]);

    let (stream_stats, ingestion_stats) = run_pipeline(chain, store, 1).await;
    assert_eq!(stream_stats.handed_off, 3);
    assert_eq!(stream_stats.backfilled, 1);
    assert_eq!(ingestion_stats.batches, 3);
    assert_eq!(ingestion_stats.transfers, 1);
    assert_eq!(ingestion_stats.swaps, 1);

    let reader = Store::open_read_only(&db_path).unwrap();
    let conn = reader.connection();

    let account: Account = peek(conn, &wallet()).unwrap();
    assert_eq!(account.total_received, eth(5));
    assert_eq!(account.total_spent, eth(2));
    assert!(account.from_exchanges.contains("Binance 14"));

    let bought: Token = peek(conn, &token()).unwrap();
    assert_eq!(bought.symbol, "PEPE");
    assert_eq!(bought.price, U256::exp10(16));
    assert_eq!(bought.times_bought, 1);

    let swaps: Vec<Swap> = all(conn).unwrap();
    assert_eq!(swaps.len(), 1);
    assert_eq!(swaps[0].wallet, wallet());

    let reports = Pattern::all_with_tokens(conn).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].pattern.exchange, "Binance 14");
    assert_eq!(reports[0].pattern.times_occurred, 1);
    assert_eq!(reports[0].symbol, "PEPE");

    let cursor = BlockCursor::load(conn).unwrap().unwrap();
    assert_eq!(cursor.number, 3);
    assert_eq!(cursor.hash, block_hash(3));
}

#[tokio::test]
async fn test_restart_resumes_after_cursor() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cexflow.db");

    let chain = Arc::new(FixtureChain::new());
    let first = chain.add_block(1, vec![tx(exchange(), wallet(), eth(3), vec![])]);
    chain.script_subscription(vec![first]);
    run_pipeline(chain.clone(), open_seeded(&db_path), 1).await;

    // Blocks 2 and 3 were produced while the runtime was down
    chain.add_block(
        2,
        vec![tx(wallet(), router(), eth(1), swap_input(&[weth(), token()]))],
    );
    chain.add_block(3, vec![tx(exchange(), wallet(), eth(4), vec![])]);
    let fourth = chain.add_block(4, vec![]);
    // Block 1 is replayed by the node and must not be applied twice
    chain.script_subscription(vec![first, fourth]);

    let (stream_stats, ingestion_stats) =
        run_pipeline(chain.clone(), Store::open(&db_path).unwrap(), 1).await;
    assert_eq!(stream_stats.backfilled, 2);
    assert_eq!(ingestion_stats.batches, 3);

    let reader = Store::open_read_only(&db_path).unwrap();
    let account: Account = peek(reader.connection(), &wallet()).unwrap();
    assert_eq!(account.total_received, eth(7));
    assert_eq!(account.total_spent, eth(1));

    let cursor = BlockCursor::load(reader.connection())
        .unwrap()
        .unwrap();
    assert_eq!(cursor.number, 4);
}

#[test]
fn test_read_only_store_rejects_writes() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cexflow.db");
    drop(open_seeded(&db_path));

    let mut reader = Store::open_read_only(&db_path).unwrap();
    let exchanges: Vec<Exchange> = all(reader.connection()).unwrap();
    assert_eq!(exchanges.len(), 1);

    let kraken = Exchange::new("Kraken 1", Address::repeat_byte(0x42));
    let result = reader.update(|tx| put(tx, &kraken));
    assert!(result.is_err());
    assert_eq!(all::<Exchange>(reader.connection()).unwrap().len(), 1);
}
