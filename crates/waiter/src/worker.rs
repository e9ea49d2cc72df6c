use std::io::{self, Write};
use std::time::Duration;

use metrics::{counter, gauge};
use thiserror::Error;
use tracing::{debug, info, warn};

use dbroute_domain::{
    config::{ConfigError, WaiterConfig, DEFAULT_DATABASES},
    probe::{ConnectionLookup, ConnectionProbe, ProbeError},
    routing::RoutingTable,
    services::telemetry::TelemetryError,
};
use dbroute_storage::StorageError;

use crate::pause::Pause;

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Probe(ProbeError),
    #[error("database `{0}` is not configured")]
    UnknownAlias(String),
    #[error("failed to write progress: {0}")]
    Io(#[from] io::Error),
}

/// Where a single alias is in its wait cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Checking,
    Failed,
    Ready,
}

/// Databases to wait for, in order, and the pause after each failed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPlan {
    aliases: Vec<String>,
    retry_interval: Duration,
}

impl WaitPlan {
    pub fn new<I, S>(aliases: I, retry_interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            aliases: aliases.into_iter().map(Into::into).collect(),
            retry_interval,
        }
    }

    pub fn from_config(config: &WaiterConfig) -> Self {
        Self::new(config.aliases(), config.retry_interval())
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

impl Default for WaitPlan {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASES, DEFAULT_RETRY_INTERVAL)
    }
}

/// Probe statistics for one alias that reached `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasReport {
    pub alias: String,
    pub attempts: u32,
    pub pauses: u32,
}

/// Aliases in the order they became ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitReport {
    ready: Vec<AliasReport>,
}

impl WaitReport {
    pub fn ready(&self) -> &[AliasReport] {
        &self.ready
    }

    pub fn completion_order(&self) -> Vec<&str> {
        self.ready.iter().map(|entry| entry.alias.as_str()).collect()
    }

    pub fn total_attempts(&self) -> u32 {
        self.ready.iter().map(|entry| entry.attempts).sum()
    }

    pub fn total_pauses(&self) -> u32 {
        self.ready.iter().map(|entry| entry.pauses).sum()
    }
}

/// Blocks until every alias in `plan` answers its probe, one alias at a time.
///
/// Transient probe failures are reported to `out` and retried after the
/// plan's interval, forever. Any other failure, or an alias the lookup does
/// not know, stops the run immediately; later aliases are never probed.
pub async fn wait_for_databases<L, P, W>(
    lookup: &L,
    plan: &WaitPlan,
    pause: &P,
    out: &mut W,
) -> Result<WaitReport, WaitError>
where
    L: ConnectionLookup + ?Sized,
    P: Pause + ?Sized,
    W: Write,
{
    writeln!(out, "Waiting for database...")?;
    let mut report = WaitReport::default();

    for alias in plan.aliases() {
        let probe = lookup
            .probe(alias)
            .ok_or_else(|| WaitError::UnknownAlias(alias.clone()))?;
        let entry = wait_for_alias(alias, probe, plan.retry_interval(), pause, out).await?;
        report.ready.push(entry);
        gauge!("waiter_databases_ready").set(report.ready.len() as f64);
    }

    info!(
        databases = report.ready.len(),
        attempts = report.total_attempts(),
        "all databases available"
    );
    Ok(report)
}

async fn wait_for_alias<P, W>(
    alias: &str,
    probe: &dyn ConnectionProbe,
    retry_interval: Duration,
    pause: &P,
    out: &mut W,
) -> Result<AliasReport, WaitError>
where
    P: Pause + ?Sized,
    W: Write,
{
    let mut state = ProbeState::Checking;
    let mut attempts = 0u32;
    let mut pauses = 0u32;

    loop {
        match state {
            ProbeState::Checking => {
                attempts += 1;
                state = match probe.ensure_connection().await {
                    Ok(()) => {
                        record_attempt(alias, "ready");
                        ProbeState::Ready
                    }
                    Err(err) if err.is_transient() => {
                        record_attempt(alias, "unavailable");
                        warn!(alias, attempts, error = %err, "database unavailable");
                        writeln!(
                            out,
                            "Database {alias} unavailable, waiting {}...",
                            describe_interval(retry_interval)
                        )?;
                        ProbeState::Failed
                    }
                    Err(err) => {
                        record_attempt(alias, "fatal");
                        return Err(WaitError::Probe(err));
                    }
                };
            }
            ProbeState::Failed => {
                pause.pause(retry_interval).await;
                pauses += 1;
                debug!(alias, pauses, "retrying database probe");
                state = ProbeState::Checking;
            }
            ProbeState::Ready => {
                info!(alias, attempts, "database available");
                writeln!(out, "Database {alias} available!")?;
                return Ok(AliasReport {
                    alias: alias.to_string(),
                    attempts,
                    pauses,
                });
            }
        }
    }
}

fn record_attempt(alias: &str, result: &'static str) {
    counter!(
        "waiter_probe_attempts_total",
        "alias" => alias.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Human form of the retry interval used in progress lines.
pub fn describe_interval(interval: Duration) -> String {
    if interval.subsec_nanos() == 0 {
        match interval.as_secs() {
            1 => "1 second".to_string(),
            secs => format!("{secs} seconds"),
        }
    } else {
        match interval.as_millis() {
            1 => "1 millisecond".to_string(),
            millis => format!("{millis} milliseconds"),
        }
    }
}

/// Databases the routing table sends traffic to that the plan never waits
/// for.
pub fn unwaited_databases<'a>(routes: &'a RoutingTable, plan: &WaitPlan) -> Vec<&'a str> {
    routes
        .databases()
        .into_iter()
        .filter(|database| !plan.aliases().iter().any(|alias| alias == database))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dbroute_domain::probe::{ProbeResult, TransientKind};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    /// Replays scripted outcomes, then succeeds forever.
    struct ScriptedProbe {
        alias: String,
        script: Mutex<VecDeque<ProbeResult<()>>>,
        calls: AtomicUsize,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedProbe {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConnectionProbe for ScriptedProbe {
        async fn ensure_connection(&self) -> ProbeResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(self.alias.clone());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct MockConnections {
        probes: HashMap<String, ScriptedProbe>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MockConnections {
        fn with(mut self, alias: &str, script: Vec<ProbeResult<()>>) -> Self {
            self.probes.insert(
                alias.to_string(),
                ScriptedProbe {
                    alias: alias.to_string(),
                    script: Mutex::new(script.into()),
                    calls: AtomicUsize::new(0),
                    log: self.log.clone(),
                },
            );
            self
        }

        fn calls(&self, alias: &str) -> usize {
            self.probes[alias].calls()
        }

        fn probe_log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl ConnectionLookup for MockConnections {
        fn probe(&self, alias: &str) -> Option<&dyn ConnectionProbe> {
            self.probes
                .get(alias)
                .map(|probe| probe as &dyn ConnectionProbe)
        }
    }

    #[derive(Default)]
    struct CountingPause {
        calls: AtomicUsize,
        last: Mutex<Option<Duration>>,
    }

    #[async_trait]
    impl Pause for CountingPause {
        async fn pause(&self, interval: Duration) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(interval);
        }
    }

    fn driver_down(alias: &str) -> ProbeResult<()> {
        Err(ProbeError::transient(
            TransientKind::DriverOperational,
            alias,
            "connection refused",
        ))
    }

    fn orm_down(alias: &str) -> ProbeResult<()> {
        Err(ProbeError::transient(
            TransientKind::OrmOperational,
            alias,
            "database system is starting up",
        ))
    }

    fn all_up() -> MockConnections {
        DEFAULT_DATABASES
            .iter()
            .fold(MockConnections::default(), |mocks, alias| {
                mocks.with(alias, Vec::new())
            })
    }

    fn output(buffer: Vec<u8>) -> Vec<String> {
        String::from_utf8(buffer)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn ready_databases_are_probed_once() {
        let connections = all_up();
        let pause = CountingPause::default();
        let mut out = Vec::new();

        let report = wait_for_databases(&connections, &WaitPlan::default(), &pause, &mut out)
            .await
            .expect("all databases available");

        for alias in DEFAULT_DATABASES {
            assert_eq!(connections.calls(alias), 1);
        }
        assert_eq!(pause.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.total_attempts(), 4);
        assert_eq!(
            output(out),
            vec![
                "Waiting for database...",
                "Database auth available!",
                "Database users available!",
                "Database videos available!",
                "Database billing available!",
            ]
        );
    }

    #[tokio::test]
    async fn retries_until_the_database_comes_up() {
        let connections = all_up().with(
            "auth",
            vec![
                driver_down("auth"),
                driver_down("auth"),
                orm_down("auth"),
                orm_down("auth"),
                orm_down("auth"),
            ],
        );
        let pause = CountingPause::default();
        let mut out = Vec::new();

        wait_for_databases(&connections, &WaitPlan::default(), &pause, &mut out)
            .await
            .expect("auth eventually available");

        assert_eq!(connections.calls("auth"), 6);
        for alias in ["users", "videos", "billing"] {
            assert_eq!(connections.calls(alias), 1);
        }
        assert_eq!(pause.calls.load(Ordering::SeqCst), 5);
        assert_eq!(*pause.last.lock().unwrap(), Some(Duration::from_secs(1)));

        let lines = output(out);
        assert_eq!(
            lines
                .iter()
                .filter(|line| *line == "Database auth unavailable, waiting 1 second...")
                .count(),
            5
        );
        assert_eq!(lines.last().map(String::as_str), Some("Database billing available!"));
    }

    #[tokio::test]
    async fn processes_aliases_in_sequence() {
        let connections = MockConnections::default()
            .with("a", vec![driver_down("a"), orm_down("a")])
            .with("b", Vec::new())
            .with("c", Vec::new());
        let pause = CountingPause::default();
        let plan = WaitPlan::new(["a", "b", "c"], Duration::from_secs(1));
        let mut out = Vec::new();

        let report = wait_for_databases(&connections, &plan, &pause, &mut out)
            .await
            .expect("all available");

        assert_eq!(report.total_attempts(), 5);
        assert_eq!(report.total_pauses(), 2);
        assert_eq!(pause.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.completion_order(), vec!["a", "b", "c"]);
        assert_eq!(connections.probe_log(), vec!["a", "a", "a", "b", "c"]);
        assert_eq!(
            report.ready()[0],
            AliasReport {
                alias: "a".into(),
                attempts: 3,
                pauses: 2,
            }
        );
    }

    #[tokio::test]
    async fn unrecognized_error_stops_without_retry() {
        let connections = MockConnections::default()
            .with("a", vec![Err(ProbeError::fatal("a", "authentication failed"))])
            .with("b", Vec::new());
        let pause = CountingPause::default();
        let plan = WaitPlan::new(["a", "b"], Duration::from_secs(1));
        let mut out = Vec::new();

        let err = wait_for_databases(&connections, &plan, &pause, &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Probe(ProbeError::Fatal { ref alias, .. }) if alias == "a"));
        assert_eq!(connections.calls("a"), 1);
        assert_eq!(connections.calls("b"), 0);
        assert_eq!(pause.calls.load(Ordering::SeqCst), 0);
        assert_eq!(output(out), vec!["Waiting for database..."]);
    }

    #[tokio::test]
    async fn fatal_error_after_transient_failures_still_stops() {
        let connections = MockConnections::default()
            .with("a", Vec::new())
            .with("b", vec![driver_down("b"), Err(ProbeError::fatal("b", "bad name"))])
            .with("c", Vec::new());
        let pause = CountingPause::default();
        let plan = WaitPlan::new(["a", "b", "c"], Duration::from_secs(1));
        let mut out = Vec::new();

        let err = wait_for_databases(&connections, &plan, &pause, &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Probe(_)));
        assert_eq!(connections.calls("b"), 2);
        assert_eq!(connections.calls("c"), 0);
        assert_eq!(pause.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_alias_is_fatal() {
        let connections = MockConnections::default().with("a", Vec::new());
        let pause = CountingPause::default();
        let plan = WaitPlan::new(["a", "ghost", "a"], Duration::from_secs(1));
        let mut out = Vec::new();

        let err = wait_for_databases(&connections, &plan, &pause, &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::UnknownAlias(ref alias) if alias == "ghost"));
        assert_eq!(connections.calls("a"), 1);
    }

    #[tokio::test]
    async fn rerunning_after_success_probes_once_each() {
        let connections = all_up().with("videos", vec![orm_down("videos")]);
        let pause = CountingPause::default();
        let plan = WaitPlan::default();

        wait_for_databases(&connections, &plan, &pause, &mut Vec::new())
            .await
            .expect("first run completes");
        let report = wait_for_databases(&connections, &plan, &pause, &mut Vec::new())
            .await
            .expect("second run completes");

        assert_eq!(report.total_attempts(), 4);
        assert_eq!(report.total_pauses(), 0);
        assert_eq!(pause.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_aliases_are_rechecked() {
        let connections = MockConnections::default().with("a", Vec::new());
        let pause = CountingPause::default();
        let plan = WaitPlan::new(["a", "a"], Duration::from_secs(1));

        let report = wait_for_databases(&connections, &plan, &pause, &mut Vec::new())
            .await
            .expect("completes");

        assert_eq!(connections.calls("a"), 2);
        assert_eq!(report.completion_order(), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn progress_line_reflects_configured_interval() {
        let connections = MockConnections::default().with("a", vec![driver_down("a")]);
        let pause = CountingPause::default();
        let plan = WaitPlan::new(["a"], Duration::from_millis(250));
        let mut out = Vec::new();

        wait_for_databases(&connections, &plan, &pause, &mut out)
            .await
            .expect("completes");

        assert_eq!(
            output(out),
            vec![
                "Waiting for database...",
                "Database a unavailable, waiting 250 milliseconds...",
                "Database a available!",
            ]
        );
        assert_eq!(*pause.last.lock().unwrap(), Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn waits_on_registry_backed_handles() {
        use dbroute_domain::config::DatabaseSettings;
        use dbroute_storage::ConnectionRegistry;

        let settings = [
            DatabaseSettings::new("auth", "sqlite::memory:").unwrap(),
            DatabaseSettings::new("videos", "sqlite::memory:").unwrap(),
        ];
        let registry = ConnectionRegistry::from_settings(&settings).expect("registry builds");
        let pause = CountingPause::default();
        let plan = WaitPlan::new(["auth", "videos"], Duration::from_secs(1));
        let mut out = Vec::new();

        let report = wait_for_databases(&registry, &plan, &pause, &mut out)
            .await
            .expect("sqlite databases answer");

        assert_eq!(report.completion_order(), vec!["auth", "videos"]);
        assert_eq!(pause.calls.load(Ordering::SeqCst), 0);
        assert!(registry.get("auth").and_then(|handle| handle.sql_connection()).is_some());
    }

    #[tokio::test]
    async fn repeated_alias_from_env_is_waited_twice() {
        use dbroute_domain::config::WaiterConfig;
        use dbroute_storage::ConnectionRegistry;
        use std::env;

        let config = {
            let _guard = ENV_GUARD.lock().unwrap();
            env::set_var("DBROUTE_SKIP_DOTENV", "1");
            env::set_var("DBROUTE_DATABASES", "auth,auth");
            env::set_var("DBROUTE_DATABASE_URL_AUTH", "sqlite::memory:");
            env::remove_var("DBROUTE_ROUTES");
            env::remove_var("DBROUTE_RETRY_INTERVAL_MS");
            let config = WaiterConfig::load_from_env();
            env::remove_var("DBROUTE_DATABASES");
            env::remove_var("DBROUTE_DATABASE_URL_AUTH");
            config.expect("config loads")
        };
        let registry = ConnectionRegistry::from_settings(config.databases()).expect("registry builds");
        let plan = WaitPlan::from_config(&config);
        let pause = CountingPause::default();
        let mut out = Vec::new();

        let report = wait_for_databases(&registry, &plan, &pause, &mut out)
            .await
            .expect("sqlite answers");

        assert_eq!(registry.len(), 1);
        assert_eq!(report.completion_order(), vec!["auth", "auth"]);
        assert_eq!(report.total_attempts(), 2);
        assert_eq!(
            output(out),
            vec![
                "Waiting for database...",
                "Database auth available!",
                "Database auth available!",
            ]
        );
    }

    #[test]
    fn describes_intervals() {
        assert_eq!(describe_interval(Duration::from_secs(1)), "1 second");
        assert_eq!(describe_interval(Duration::from_secs(3)), "3 seconds");
        assert_eq!(describe_interval(Duration::from_millis(1)), "1 millisecond");
        assert_eq!(describe_interval(Duration::from_millis(1500)), "1500 milliseconds");
    }

    #[test]
    fn reports_routed_databases_missing_from_plan() {
        let routes = RoutingTable::parse("auth=auth,users=users,videos=media").unwrap();
        let plan = WaitPlan::new(["auth", "users"], Duration::from_secs(1));
        assert_eq!(unwaited_databases(&routes, &plan), vec!["media"]);
        assert!(unwaited_databases(&RoutingTable::default(), &WaitPlan::default()).is_empty());
    }
}
