// flowgate load driver
//
// Loads a flow-control configuration (or the built-in default), starts a request management
// system on the wall clock and drives it with synthetic client threads. Each client issues
// requests on behalf of randomly chosen users, holds its seat for a jittered service time and
// records the outcome. Ctrl+C stops the clients early; the per-level report is printed either way.

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use flowgate::{
    Clock, Decision, FlowControlConfig, Integrator, RealClock, RequestDigest,
    RequestManagementSystem,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line options.
#[derive(Parser, Debug)]
#[command(name = "flowgate", about = "Drive synthetic load through fair-queuing admission control")]
struct Args {
    /// JSON configuration file; the built-in default is used when absent
    #[arg(long)]
    config: Option<PathBuf>,
    /// Requests issued by each client
    #[arg(long, default_value_t = 200)]
    requests: usize,
    /// Number of concurrent client threads
    #[arg(long, default_value_t = 32)]
    clients: usize,
    /// Mean service time of one request, in milliseconds
    #[arg(long, default_value_t = 20)]
    service_ms: u64,
    /// Number of distinct users requests are spread over
    #[arg(long, default_value_t = 8)]
    flows: usize,
    /// Seed for user selection and service time jitter
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

/// Outcome counters shared by all clients.
#[derive(Default)]
struct Tally {
    executed: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
}

/// Build the request a client sends on behalf of user `flow`.
///
/// Even-numbered users are service accounts living in their own namespace, the others are
/// ordinary authenticated users.
fn request_for(flow: usize) -> RequestDigest {
    let user = format!("user-{flow}");
    if flow % 2 == 0 {
        RequestDigest::new(user)
            .with_groups(["system:serviceaccounts", "system:authenticated"])
            .with_namespace(format!("ns-{flow}"))
    } else {
        RequestDigest::new(user).with_groups(["system:authenticated"])
    }
}

fn run_client(
    id: usize,
    args: &Args,
    system: &RequestManagementSystem,
    executing: &Integrator,
    tally: &Tally,
    shutdown: &AtomicBool,
) {
    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(id as u64));
    let flows = args.flows.max(1);
    let mean = args.service_ms.max(1);
    for _ in 0..args.requests {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let request = request_for(rng.gen_range(0..flows));
        let service = Duration::from_millis(rng.gen_range(mean / 2..=mean + mean / 2));
        match system.wait(&request) {
            Decision::Execute(after) => {
                executing.add(1.0);
                thread::sleep(service);
                executing.add(-1.0);
                after.finish();
                tally.executed.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Rejected => {
                tally.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Decision::TimedOut => {
                tally.timed_out.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => FlowControlConfig::from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => FlowControlConfig::default(),
    };

    let clock: Arc<dyn Clock> = Arc::new(RealClock);
    let system = RequestManagementSystem::from_config(&config, clock.clone())
        .context("starting request management")?;
    info!(
        server_concurrency_limit = system.server_concurrency_limit(),
        levels = ?system.current_state().level_names(),
        "request management started"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_flag.store(true, Ordering::Relaxed);
    })
    .context("installing Ctrl+C handler")?;

    let executing = Integrator::new(clock);
    let tally = Tally::default();
    let clients_done = AtomicBool::new(false);
    let started = Instant::now();

    thread::scope(|scope| {
        // Drop drained levels as soon as their queue sets report empty.
        let resync = system.resync_receiver();
        let system = &system;
        let clients_done = &clients_done;
        scope.spawn(move || loop {
            match resync.recv_timeout(Duration::from_millis(100)) {
                Ok(()) => system.resync(),
                Err(RecvTimeoutError::Timeout) if !clients_done.load(Ordering::Acquire) => {}
                Err(_) => break,
            }
        });

        let clients: Vec<_> = (0..args.clients)
            .map(|id| {
                let (args, executing, tally, shutdown) = (&args, &executing, &tally, &shutdown);
                scope.spawn(move || run_client(id, args, system, executing, tally, shutdown))
            })
            .collect();
        for client in clients {
            let _ = client.join();
        }
        clients_done.store(true, Ordering::Release);
    });

    let concurrency = executing.results();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        executed = tally.executed.load(Ordering::Relaxed),
        rejected = tally.rejected.load(Ordering::Relaxed),
        timed_out = tally.timed_out.load(Ordering::Relaxed),
        average_concurrency = concurrency.average,
        "load finished"
    );

    let state = system.current_state();
    for name in state.level_names() {
        let Some(level) = state.priority_level(name) else {
            continue;
        };
        match level.queue_set() {
            Some(queues) => info!(
                level = name,
                concurrency_limit = level.concurrency_limit(),
                desired = level.is_desired(),
                snapshot = %serde_json::to_string(&queues.snapshot())?,
                "priority level report"
            ),
            None => info!(level = name, exempt = level.config().exempt, "priority level report"),
        }
    }
    Ok(())
}
