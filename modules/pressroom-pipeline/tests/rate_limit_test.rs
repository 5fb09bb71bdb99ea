//! Rate limiter behavior under bursts, with tokio time paused.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;

use ai_client::AiError;
use pressroom_pipeline::infra::{RateLimitedModel, RateLimiter};
use pressroom_pipeline::testing::ScriptedModel;

const CAPACITY: u32 = 5;
const REFILL_PER_SECOND: f64 = 10.0;

// ---------------------------------------------------------------------------
// Scenario 4: a burst beyond capacity stalls, never drops
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn burst_beyond_capacity_waits_for_refill() {
    const CALLS: usize = 25;
    let replies: Vec<&str> = (0..CALLS).map(|_| r#"{"ok":true}"#).collect();
    let model = Arc::new(ScriptedModel::replying(replies));
    let limited = RateLimitedModel::new(
        model.clone(),
        Arc::new(RateLimiter::new(CAPACITY, REFILL_PER_SECOND)),
        Duration::from_secs(60),
    );

    let start = Instant::now();
    let results = join_all((0..CALLS).map(|_| limited.complete_json("system", "user"))).await;
    let elapsed = start.elapsed();

    assert!(results.iter().all(Result::is_ok), "no call may fail because of rate limiting");
    assert_eq!(model.calls(), CALLS);

    let minimum = (CALLS as f64 - f64::from(CAPACITY)) / REFILL_PER_SECOND;
    assert!(
        elapsed.as_secs_f64() >= minimum,
        "elapsed {elapsed:?} is shorter than the {minimum}s the bucket allows"
    );
}

#[tokio::test(start_paused = true)]
async fn no_window_admits_more_than_the_bucket_allows() {
    const CALLS: usize = 60;
    let limiter = Arc::new(RateLimiter::new(CAPACITY, REFILL_PER_SECOND));
    let admitted = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let handles: Vec<_> = (0..CALLS)
        .map(|_| {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                admitted.lock().unwrap().push(start.elapsed());
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let mut times = admitted.lock().unwrap().clone();
    times.sort();
    assert_eq!(times.len(), CALLS);

    // Over any window of length w the bucket admits at most capacity + rate * w.
    let window = Duration::from_secs(1);
    let bound = f64::from(CAPACITY) + REFILL_PER_SECOND * window.as_secs_f64();
    for (i, opened) in times.iter().enumerate() {
        let inside = times[i..].iter().take_while(|t| **t < *opened + window).count();
        assert!(
            inside as f64 <= bound,
            "{inside} calls admitted within {window:?} of {opened:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// Provider throttling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn provider_rate_limit_is_waited_out() {
    let model = Arc::new(ScriptedModel::new(vec![
        Err(AiError::RateLimited("quota".into())),
        Err(AiError::RateLimited("quota".into())),
        Ok(r#"{"translated_text":"ok"}"#.into()),
    ]));
    let limited = RateLimitedModel::new(
        model.clone(),
        Arc::new(RateLimiter::new(CAPACITY, REFILL_PER_SECOND)),
        Duration::from_secs(60),
    );

    let start = Instant::now();
    let reply = limited.complete_json("system", "user").await.unwrap();

    assert_eq!(reply, r#"{"translated_text":"ok"}"#);
    assert_eq!(model.calls(), 3);
    assert!(start.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn other_provider_errors_fail_immediately() {
    let model = Arc::new(ScriptedModel::new(vec![
        Err(AiError::Api {
            status: 500,
            body: "boom".into(),
        }),
        Ok("never reached".into()),
    ]));
    let limited = RateLimitedModel::new(
        model.clone(),
        Arc::new(RateLimiter::new(CAPACITY, REFILL_PER_SECOND)),
        Duration::from_secs(60),
    );

    assert!(limited.complete_json("system", "user").await.is_err());
    assert_eq!(model.calls(), 1);
}
