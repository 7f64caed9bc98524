//! Pre-call budget gate and post-call cost accounting.
//!
//! [`CostGovernor`] is the single correctness gate on spend: every model
//! call is checked against three budgets (per-run tokens, per-run spend,
//! lifetime spend) before any network traffic, and actual usage is
//! recorded after. Refusals leave a paper trail: a cost entry with
//! `abort_reason` set and a `cost_exhausted` audit event.
//!
//! Thread safety: public methods take `&self`; the run counters live
//! behind an [`std::sync::RwLock`]. One governor exists per orchestrator
//! process, guarded by the PID lockfile, so the in-memory lifetime tally
//! has a single writer.

use std::sync::Arc;
use std::sync::RwLock;

use tracing::{debug, warn};

use prospector_store::{CostEntry, Store};
use prospector_types::{AuditAction, LimitKind, PipelineError, Result};

/// Per-run in-memory counters. Destroyed with the process.
#[derive(Debug, Clone, Copy, Default)]
struct RunContext {
    tokens_sent: u64,
    tokens_received: u64,
    run_cost_usd: f64,
    /// Latch: once a refusal happens, every later check fails fast.
    aborted: Option<LimitKind>,
}

/// Snapshot of the run counters for the abort artifact and run summary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunStats {
    pub run_id: i64,
    pub tokens_sent: u64,
    pub tokens_received: u64,
    pub run_cost_usd: f64,
    pub aborted: bool,
    pub abort_reason: Option<String>,
}

/// Configured budget ceilings and token prices.
#[derive(Debug, Clone, Copy)]
pub struct Budgets {
    pub max_tokens_per_run: u64,
    pub max_usd_per_run: f64,
    pub max_usd_lifetime: f64,
    pub price_in_per_token: f64,
    pub price_out_per_token: f64,
}

/// The budget gatekeeper.
pub struct CostGovernor {
    store: Arc<Store>,
    run_id: i64,
    model: String,
    budgets: Budgets,
    context: RwLock<RunContext>,
    /// Lifetime spend, read once at construction and maintained here.
    lifetime_spend: RwLock<f64>,
}

impl CostGovernor {
    /// Construct for one run. Reads the lifetime spend from the store
    /// exactly once; it is maintained incrementally afterwards.
    pub fn new(store: Arc<Store>, run_id: i64, model: String, budgets: Budgets) -> Result<Self> {
        let lifetime = store.lifetime_spend()?;
        debug!(run_id, lifetime_spend = lifetime, "cost governor initialized");
        Ok(Self {
            store,
            run_id,
            model,
            budgets,
            context: RwLock::new(RunContext::default()),
            lifetime_spend: RwLock::new(lifetime),
        })
    }

    /// This run's identifier.
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Conservative token estimate: `ceil(len / 3.5)`.
    ///
    /// A model-specific tokenizer would be tighter; the heuristic is the
    /// safety net and rounds up so projections never under-count.
    pub fn estimate_tokens(&self, text: &str) -> u64 {
        (text.len() as f64 / 3.5).ceil() as u64
    }

    /// Cost of a call at the configured prices.
    pub fn estimate_cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        tokens_in as f64 * self.budgets.price_in_per_token
            + tokens_out as f64 * self.budgets.price_out_per_token
    }

    /// Gate a prospective call. Fails with the specific breached limit;
    /// on refusal the cost entry and audit event are already appended
    /// when this returns.
    pub fn check_before_call(&self, est_in: u64, est_out: u64) -> Result<()> {
        let projection = {
            let ctx = self.context.read().expect("governor lock poisoned");
            if let Some(which) = ctx.aborted {
                // Already latched: reproduce the refusal without another
                // paper-trail entry.
                return Err(PipelineError::CostLimitExceeded {
                    which,
                    actual: 0.0,
                    limit: 0.0,
                });
            }

            let est_cost = self.estimate_cost(est_in, est_out);
            let projected_tokens = ctx.tokens_sent + ctx.tokens_received + est_in + est_out;
            let projected_run_cost = ctx.run_cost_usd + est_cost;
            let lifetime = *self.lifetime_spend.read().expect("governor lock poisoned");
            let projected_lifetime = lifetime + est_cost;

            if projected_tokens > self.budgets.max_tokens_per_run {
                Some((
                    LimitKind::PerRunTokens,
                    projected_tokens as f64,
                    self.budgets.max_tokens_per_run as f64,
                ))
            } else if projected_run_cost > self.budgets.max_usd_per_run {
                Some((
                    LimitKind::PerRunUsd,
                    projected_run_cost,
                    self.budgets.max_usd_per_run,
                ))
            } else if projected_lifetime > self.budgets.max_usd_lifetime {
                Some((
                    LimitKind::LifetimeUsd,
                    projected_lifetime,
                    self.budgets.max_usd_lifetime,
                ))
            } else {
                None
            }
        };

        match projection {
            None => Ok(()),
            Some((which, actual, limit)) => {
                self.context.write().expect("governor lock poisoned").aborted = Some(which);
                self.record_refusal(which, actual, limit)?;
                Err(PipelineError::CostLimitExceeded {
                    which,
                    actual,
                    limit,
                })
            }
        }
    }

    /// Record actuals for one successful call. Called exactly once per
    /// executed call, never for refusals.
    pub fn record_usage(&self, actual_in: u64, actual_out: u64) -> Result<()> {
        let cost = self.estimate_cost(actual_in, actual_out);

        {
            let mut ctx = self.context.write().expect("governor lock poisoned");
            ctx.tokens_sent += actual_in;
            ctx.tokens_received += actual_out;
            ctx.run_cost_usd += cost;
        }
        {
            let mut lifetime = self.lifetime_spend.write().expect("governor lock poisoned");
            *lifetime += cost;
        }

        self.store.append_cost_entry(&CostEntry {
            run_id: self.run_id,
            tokens_in: actual_in,
            tokens_out: actual_out,
            usd_cost: cost,
            timestamp: chrono::Utc::now().timestamp(),
            model: self.model.clone(),
            abort_reason: None,
        })?;

        debug!(
            run_id = self.run_id,
            tokens_in = actual_in,
            tokens_out = actual_out,
            cost_usd = cost,
            "usage recorded"
        );
        Ok(())
    }

    /// Current run counters.
    pub fn run_stats(&self) -> RunStats {
        let ctx = self.context.read().expect("governor lock poisoned");
        RunStats {
            run_id: self.run_id,
            tokens_sent: ctx.tokens_sent,
            tokens_received: ctx.tokens_received,
            run_cost_usd: ctx.run_cost_usd,
            aborted: ctx.aborted.is_some(),
            abort_reason: ctx.aborted.map(|k| k.as_str().to_string()),
        }
    }

    /// Lifetime spend as maintained in memory.
    pub fn lifetime_spend(&self) -> f64 {
        *self.lifetime_spend.read().expect("governor lock poisoned")
    }

    fn record_refusal(&self, which: LimitKind, actual: f64, limit: f64) -> Result<()> {
        warn!(
            run_id = self.run_id,
            which = %which,
            actual,
            limit,
            "refusing model call: budget would be breached"
        );

        self.store.append_cost_entry(&CostEntry {
            run_id: self.run_id,
            tokens_in: 0,
            tokens_out: 0,
            usd_cost: 0.0,
            timestamp: chrono::Utc::now().timestamp(),
            model: self.model.clone(),
            abort_reason: Some(which.as_str().to_string()),
        })?;

        self.store.append_audit(
            AuditAction::CostExhausted,
            None,
            Some(self.run_id),
            serde_json::json!({
                "which": which.as_str(),
                "actual": actual,
                "limit": limit,
            }),
            false,
            true,
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for CostGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctx = self.context.read().map(|c| *c).unwrap_or_default();
        f.debug_struct("CostGovernor")
            .field("run_id", &self.run_id)
            .field("tokens_sent", &ctx.tokens_sent)
            .field("tokens_received", &ctx.tokens_received)
            .field("run_cost_usd", &ctx.run_cost_usd)
            .field("aborted", &ctx.aborted)
            .finish()
    }
}
