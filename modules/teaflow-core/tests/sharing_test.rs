//! Integration tests for the shared upstream: start/stop policies, replay and
//! regeneration.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use futures::future::join_all;
use futures::StreamExt;
use teaflow_core::{
    Component, Env, Initial, Messages, Scope, ShareOptions, Snapshot, SnapshotStream, Started,
    UpdateExt,
};

// ---------------------------------------------------------------------------
// Counting component: each generation starts at 100 * its initializer call
// ---------------------------------------------------------------------------

fn counted(calls: Arc<AtomicU32>, options: ShareOptions) -> Component<u32, u32, u32> {
    let env = Env::new(
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { anyhow::Ok(Initial::from_state(call * 100)) }
        },
        |_: u32| async { anyhow::Ok(Messages::new()) },
        |message: &u32, state: &u32| anyhow::Ok((state + message).no_command()),
        Scope::new(),
    )
    .with_share_options(options);
    Component::new(env)
}

fn options(started: Started) -> ShareOptions {
    ShareOptions::builder().started(started).build()
}

async fn next_state(snapshots: &mut SnapshotStream<u32, u32, u32>) -> u32 {
    *snapshots
        .next()
        .await
        .expect("snapshot stream ended early")
        .expect("component failed")
        .state()
}

/// Skip replayed snapshots of earlier generations.
async fn wait_for_state(snapshots: &mut SnapshotStream<u32, u32, u32>, expected: u32) {
    while next_state(snapshots).await != expected {}
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_subscribers_share_one_initialization() {
    for started in [Started::Lazily, Started::while_subscribed()] {
        let calls = Arc::new(AtomicU32::new(0));
        let component = counted(Arc::clone(&calls), options(started));

        let mut subscribers: Vec<_> = (0..8).map(|_| component.observe_snapshots()).collect();
        let firsts = join_all(subscribers.iter_mut().map(|s| s.next())).await;

        for first in firsts {
            let first = first.unwrap().unwrap();
            assert!(first.is_initial());
            assert_eq!(*first.state(), 100);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn resubscribing_after_everyone_left_reinitializes_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(Arc::clone(&calls), options(Started::while_subscribed()));

    let mut first = component.observe_snapshots();
    assert_eq!(next_state(&mut first).await, 100);
    drop(first);

    let mut second = component.observe_snapshots();
    // The replay cache outlives the stop: the old initial comes first.
    assert_eq!(next_state(&mut second).await, 100);
    assert_eq!(next_state(&mut second).await, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let mut third = component.observe_snapshots();
    assert_eq!(next_state(&mut third).await, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn eager_components_start_without_subscribers() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(Arc::clone(&calls), options(Started::Eagerly));

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 100);
    drop(snapshots);

    let mut snapshots = component.invoke(5);
    assert_eq!(next_state(&mut snapshots).await, 100);
    assert_eq!(next_state(&mut snapshots).await, 105);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn eager_components_built_outside_a_runtime_start_on_the_first_subscriber() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(Arc::clone(&calls), options(Started::Eagerly));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let mut snapshots = component.observe_snapshots();
        assert_eq!(next_state(&mut snapshots).await, 100);
        drop(snapshots);

        let mut snapshots = component.invoke(1);
        assert_eq!(next_state(&mut snapshots).await, 100);
        assert_eq!(next_state(&mut snapshots).await, 101);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lazy_components_keep_running_without_subscribers() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(Arc::clone(&calls), options(Started::Lazily));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let mut snapshots = component.invoke(1);
    assert_eq!(next_state(&mut snapshots).await, 100);
    assert_eq!(next_state(&mut snapshots).await, 101);
    drop(snapshots);

    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 101);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_subscribers_receive_the_replay_tail_first() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(
        calls,
        ShareOptions::builder()
            .started(Started::Lazily)
            .replay(2)
            .build(),
    );

    let mut early = component.invoke_all([1, 2, 3]);
    for expected in [100, 101, 103, 106] {
        assert_eq!(next_state(&mut early).await, expected);
    }

    let mut late = component.invoke(4);
    for expected in [103, 106, 110] {
        assert_eq!(next_state(&mut late).await, expected);
    }
    assert_eq!(next_state(&mut early).await, 110);
}

#[tokio::test(start_paused = true)]
async fn subscribers_returning_within_the_grace_period_keep_the_generation() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(
        Arc::clone(&calls),
        options(Started::WhileSubscribed {
            stop_timeout: Duration::from_secs(5),
            replay_expiration: None,
        }),
    );

    let mut snapshots = component.invoke(7);
    assert_eq!(next_state(&mut snapshots).await, 100);
    assert_eq!(next_state(&mut snapshots).await, 107);
    drop(snapshots);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 107);
    drop(snapshots);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut snapshots = component.observe_snapshots();
    wait_for_state(&mut snapshots, 200).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_replay_expiration_clears_the_cache_on_stop() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(
        Arc::clone(&calls),
        options(Started::WhileSubscribed {
            stop_timeout: Duration::ZERO,
            replay_expiration: Some(Duration::ZERO),
        }),
    );

    let mut snapshots = component.invoke(1);
    assert_eq!(next_state(&mut snapshots).await, 100);
    assert_eq!(next_state(&mut snapshots).await, 101);
    drop(snapshots);

    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 200);
}

#[tokio::test(start_paused = true)]
async fn replay_cache_expires_after_the_configured_delay() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(
        Arc::clone(&calls),
        options(Started::WhileSubscribed {
            stop_timeout: Duration::ZERO,
            replay_expiration: Some(Duration::from_secs(30)),
        }),
    );

    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 100);
    drop(snapshots);

    // Within the expiration window the stale tail is still replayed.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 100);
    assert_eq!(next_state(&mut snapshots).await, 200);
    drop(snapshots);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 300);
}

// ---------------------------------------------------------------------------
// Regeneration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FeedMsg {
    Fetch,
    Loaded(&'static str),
}

fn slow_feed(scope: Scope) -> Component<FeedMsg, Vec<&'static str>, &'static str> {
    let env = Env::new(
        || async { anyhow::Ok(Initial::from_state(Vec::new())) },
        |label: &'static str| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            anyhow::Ok(Messages::from([FeedMsg::Loaded(label)]))
        },
        |message: &FeedMsg, state: &Vec<&'static str>| {
            anyhow::Ok(match message {
                FeedMsg::Fetch => state.clone().command("stale"),
                FeedMsg::Loaded(label) => {
                    let mut next = state.clone();
                    next.push(*label);
                    next.no_command()
                }
            })
        },
        scope,
    );
    Component::new(env)
}

type FeedStream = SnapshotStream<FeedMsg, Vec<&'static str>, &'static str>;

async fn next_feed(snapshots: &mut FeedStream) -> Snapshot<FeedMsg, Vec<&'static str>, &'static str> {
    snapshots.next().await.unwrap().unwrap()
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_in_flight_resolutions() {
    let component = slow_feed(Scope::new());
    let (tx, rx) = mpsc::unbounded();
    let mut snapshots = component.subscribe(rx);

    assert!(next_feed(&mut snapshots).await.is_initial());
    tx.unbounded_send(FeedMsg::Fetch).unwrap();
    let fetching = next_feed(&mut snapshots).await;
    assert!(fetching.commands().contains("stale"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(component.reset(Initial::from_state(vec!["reset"])));

    let reset = next_feed(&mut snapshots).await;
    assert!(reset.is_initial());
    assert_eq!(reset.state(), &vec!["reset"]);

    // Long past the point where the old resolution would have landed.
    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.unbounded_send(FeedMsg::Loaded("fresh")).unwrap();

    let fresh = next_feed(&mut snapshots).await;
    assert_eq!(fresh.state(), &vec!["reset", "fresh"]);
    assert_eq!(fresh.previous_state(), Some(&vec!["reset"]));
}

#[tokio::test(start_paused = true)]
async fn resubscribing_discards_the_stopped_generations_work() {
    let component = slow_feed(Scope::new());

    let mut snapshots = component.invoke(FeedMsg::Fetch);
    assert!(next_feed(&mut snapshots).await.is_initial());
    assert!(next_feed(&mut snapshots).await.commands().contains("stale"));
    drop(snapshots);

    let (tx, rx) = mpsc::unbounded();
    let mut snapshots = component.subscribe(rx);
    // Replay of the stopped generation, then the new generation's initial.
    assert_eq!(next_feed(&mut snapshots).await.message(), Some(&FeedMsg::Fetch));
    let restarted = next_feed(&mut snapshots).await;
    assert!(restarted.is_initial());

    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.unbounded_send(FeedMsg::Loaded("fresh")).unwrap();
    assert_eq!(next_feed(&mut snapshots).await.state(), &vec!["fresh"]);
}

/// Counts live resolver futures. Created when the resolver is called, so an
/// aborted task is counted even if it never got polled.
struct Live(Arc<AtomicUsize>);

impl Live {
    fn new(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn hanging(live: Arc<AtomicUsize>, started: Started) -> Component<u32, u32, u32> {
    let env = Env::new(
        || async { anyhow::Ok(Initial::from_state(0)) },
        move |_: u32| {
            let guard = Live::new(&live);
            async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                anyhow::Ok(Messages::new())
            }
        },
        |message: &u32, state: &u32| anyhow::Ok((state + message).command(*message)),
        Scope::new(),
    )
    .with_share_options(options(started));
    Component::new(env)
}

#[tokio::test(start_paused = true)]
async fn stopping_aborts_the_generations_resolver_tasks() {
    let live = Arc::new(AtomicUsize::new(0));
    let component = hanging(Arc::clone(&live), Started::while_subscribed());

    let mut snapshots = component.invoke(1);
    assert_eq!(next_state(&mut snapshots).await, 0);
    assert_eq!(next_state(&mut snapshots).await, 1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(live.load(Ordering::SeqCst), 1);

    drop(snapshots);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn reset_aborts_the_replaced_generations_resolver_tasks() {
    let live = Arc::new(AtomicUsize::new(0));
    let component = hanging(Arc::clone(&live), Started::Lazily);

    let (tx, rx) = mpsc::unbounded();
    let mut snapshots = component.subscribe(rx);
    assert_eq!(next_state(&mut snapshots).await, 0);
    tx.unbounded_send(2).unwrap();
    assert_eq!(next_state(&mut snapshots).await, 2);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(live.load(Ordering::SeqCst), 1);

    assert!(component.reset(Initial::from_state(50)));
    assert_eq!(next_state(&mut snapshots).await, 50);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(live.load(Ordering::SeqCst), 0);

    // The subscriber is still attached to the new generation.
    tx.unbounded_send(3).unwrap();
    assert_eq!(next_state(&mut snapshots).await, 53);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(live.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reset_is_refused_without_a_live_generation() {
    let calls = Arc::new(AtomicU32::new(0));
    let component = counted(Arc::clone(&calls), options(Started::while_subscribed()));
    assert!(!component.reset(Initial::from_state(1)));

    let mut snapshots = component.observe_snapshots();
    assert_eq!(next_state(&mut snapshots).await, 100);
    assert!(component.reset(Initial::from_state(1)));
    assert_eq!(next_state(&mut snapshots).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
