//! Per-token adaptive poll loop (§4.6). Runs until retirement, a posted
//! signal (handed off to the post-call monitor), or external cancellation.

use super::token::{LatestSnapshot, PollPhase, TrackedToken};
use super::{now, ActiveTokenTracker, TokenEvent};
use crate::metrics::metrics;
use crate::types::{EngineInput, RetirementReason, Signal, TokenLifecycleState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Consecutive failed polls (both DEX and on-chain sources erroring) before
/// a token is retired as unreachable.
const SOURCE_FAILURE_RETIREMENT_THRESHOLD: u32 = 5;
/// Rolling window used to read back third-party telegram call stats.
const TELEGRAM_STATS_WINDOW_SECS: i64 = 86_400;

pub async fn run(
    tracker: Arc<ActiveTokenTracker>,
    mut state: TrackedToken,
    mut events: mpsc::Receiver<TokenEvent>,
    cancel: CancellationToken,
) {
    loop {
        let now_ts = now();

        if now_ts - state.first_seen_at > tracker.config.polling.max_age_secs as i64 {
            tracker.retire(state.address, &state.symbol, RetirementReason::MaxAgeExceeded, now_ts).await;
            break;
        }

        let phase = state.poll_phase(
            tracker.config.polling.initial_duration_secs as i64,
            now_ts,
            tracker.config.polling.stuck_threshold,
            tracker.config.early_kill.check_window_secs as i64,
        );
        let interval_secs = match phase {
            PollPhase::Initial => tracker.config.polling.initial_interval_secs,
            PollPhase::Normal => tracker.config.polling.normal_interval_secs,
            PollPhase::Slow => tracker.config.polling.slow_interval_secs,
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("🎯 poll loop for {} cancelled", state.symbol);
                break;
            }
            received = events.recv() => {
                match received {
                    Some(TokenEvent::KolBuy { wallet, tier, timestamp }) => {
                        state.record_kol_buy(wallet, tier, timestamp);
                    }
                    Some(TokenEvent::TelegramCall(event)) => {
                        tracker.calls.record(event);
                    }
                    None => {}
                }
                continue;
            }
            _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
        }

        let cycle_start = std::time::Instant::now();
        if run_poll_cycle(&tracker, &mut state).await {
            break;
        }
        metrics().poll_cycle_latency.observe(cycle_start.elapsed().as_secs_f64());
    }

    tracker.remove(&state.address);
}

/// One poll cycle: fetch, score, and act on the result. Returns `true` when
/// the loop should stop (retirement or hand-off to the post-call monitor).
async fn run_poll_cycle(tracker: &Arc<ActiveTokenTracker>, state: &mut TrackedToken) -> bool {
    state.polls_elapsed += 1;
    state.last_poll_at = now();

    let token_data = tracker.fetcher.get_token_data(state.address).await;
    let bonding = tracker.fetcher.get_bonding_curve(state.address).await;

    if state.symbol.is_empty() && state.name.is_empty() {
        let metadata = tracker.fetcher.get_metadata(state.address).await;
        state.symbol = metadata.symbol;
        state.name = metadata.name;
        state.latest.description = metadata.description;
    }

    let both_failed = token_data.source_error.is_some() && bonding.source_error.is_some();
    state.consecutive_all_sources_failed = if both_failed { state.consecutive_all_sources_failed + 1 } else { 0 };
    if state.consecutive_all_sources_failed >= SOURCE_FAILURE_RETIREMENT_THRESHOLD {
        let now_ts = now();
        tracker.retire(state.address, &state.symbol, RetirementReason::SourceUnavailable, now_ts).await;
        return true;
    }

    state.latest = LatestSnapshot {
        price_usd: token_data.price_usd,
        market_cap: token_data.market_cap,
        liquidity_usd: token_data.liquidity_usd,
        bonding_progress_pct: bonding.progress_pct,
        graduated: bonding.graduated,
        holder_count: state.latest.holder_count,
        volume_24h: token_data.volume_24h,
        buys_24h: token_data.buys_24h,
        sells_24h: token_data.sells_24h,
        price_change_1h: token_data.price_change_1h,
        price_change_6h: token_data.price_change_6h,
        price_change_24h: token_data.price_change_24h,
        symbol: state.symbol.clone(),
        name: state.name.clone(),
        description: state.latest.description.clone(),
        top10_pct: state.latest.top10_pct,
        source_error: token_data.source_error.clone(),
    };

    let now_ts = now();
    let multi_kol_convergence_pending = state.check_multi_kol_convergence(now_ts);
    let (distinct_telegram_groups, total_telegram_mentions) =
        tracker.calls.stats(&state.address, TELEGRAM_STATS_WINDOW_SECS, now_ts);

    let input = EngineInput {
        token: state.address,
        symbol: state.symbol.clone(),
        name: state.name.clone(),
        description: state.latest.description.clone(),
        price_usd: token_data.price_usd,
        market_cap: token_data.market_cap,
        liquidity_usd: token_data.liquidity_usd,
        volume_24h: token_data.volume_24h,
        buys_24h: token_data.buys_24h,
        sells_24h: token_data.sells_24h,
        price_change_1h: token_data.price_change_1h,
        bonding_progress_pct: bonding.progress_pct,
        graduated: bonding.graduated,
        holder_count: state.latest.holder_count,
        token_age_secs: now_ts - state.first_seen_at,
        polls_elapsed: state.polls_elapsed,
        unique_buyer_count: state.unique_buyer_count,
        kol_contributions: state.kol_contributions(),
        multi_kol_convergence_pending,
        distinct_telegram_groups,
        total_telegram_mentions,
        previous_top10_pct: state.previous_top10_pct,
    };

    let breakdown = tracker.engine.score(&input).await;
    if let Some((holder_count, top10_pct)) = breakdown.observed_holders {
        state.latest.holder_count = holder_count;
        state.latest.top10_pct = Some(top10_pct);
        state.previous_top10_pct = Some(top10_pct);
    }
    state.record_score(breakdown.final_score, now_ts, tracker.config.low_conviction.threshold);
    if let Err(e) = tracker.decision_log.log(state.address, &state.symbol, &breakdown, now_ts) {
        log::error!("📋 failed to write decision log row for {}: {}", state.symbol, e);
    }

    if breakdown.data_quality_failed {
        return false;
    }

    if breakdown.emergency_stopped {
        if breakdown.rug_pull_stop {
            tracker.retire(state.address, &state.symbol, RetirementReason::EarlyKill, now_ts).await;
            return true;
        }
        // Phase 1's soft stops (too young, dead launch, thin liquidity) are a
        // per-pass `passed=false`, not a retirement reason — keep polling.
        return false;
    }

    if bonding.progress_pct >= tracker.config.early_kill.trigger_at_bonding_pct {
        let new_buyers = state.new_buyers_within(tracker.config.early_kill.check_window_secs as i64, now_ts);
        if new_buyers < tracker.config.early_kill.min_new_buyers {
            tracker.retire(state.address, &state.symbol, RetirementReason::EarlyKill, now_ts).await;
            return true;
        }
    }

    if breakdown.passed {
        post_signal(tracker, state, &input, breakdown.final_score).await;
        return true;
    }

    if now_ts - state.last_nonzero_conviction_at >= tracker.config.low_conviction.sustained_secs {
        tracker.retire(state.address, &state.symbol, RetirementReason::LowConvictionSustained, now_ts).await;
        return true;
    }

    false
}

async fn post_signal(tracker: &Arc<ActiveTokenTracker>, state: &mut TrackedToken, input: &EngineInput, score: f64) {
    let now_ts = now();
    let signal = Signal {
        token: state.address,
        score: score.round() as i32,
        posted_at: now_ts,
        message_id: None,
        entry_price: input.price_usd,
        entry_liquidity: input.liquidity_usd,
        buy_percentage: buy_percentage(input.buys_24h, input.sells_24h),
        kol_wallets: state.kol_buys.iter().map(|b| b.wallet).collect(),
        narratives: Vec::new(),
        symbol: state.symbol.clone(),
        delivery_pending: true,
    };

    tracker.mark_signaled(state.address);

    let _outcome = tracker.publisher.publish(&signal).await;
    if let Err(e) = tracker.store.record_signal(&signal).await {
        log::error!("💾 failed to persist signal for {}: {}", signal.symbol, e);
    }

    state.signal_posted = true;
    state.signal_price = Some(input.price_usd);
    state.signal_time = Some(now_ts);
    state.state = TokenLifecycleState::Signaled;

    log::info!("🧠 signal posted for {} at score {:.1}", signal.symbol, score);

    let monitor_cancel = CancellationToken::new();
    tracker.monitor.spawn(signal, monitor_cancel);
}

fn buy_percentage(buys_24h: u64, sells_24h: u64) -> f64 {
    let total = buys_24h + sells_24h;
    if total == 0 {
        return 0.0;
    }
    buys_24h as f64 / total as f64 * 100.0
}
