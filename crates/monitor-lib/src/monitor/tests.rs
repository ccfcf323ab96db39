//! Integration tests for the monitoring loop
//!
//! These tests drive the loop with a scripted stats source and a temp
//! dataset file, so no container runtime is required.

#[cfg(test)]
mod scripted_stream_tests {
    use crate::error::{ConnectError, StreamError};
    use crate::models::{CpuStats, CpuUsage, MemoryStats, NetworkStats, StatsSnapshot};
    use crate::monitor::{Monitor, MonitorConfig, MonitorState, ReconnectConfig};
    use crate::source::{async_trait, StatsSource, StatsStream};
    use crate::writer::{COLUMNS, DELIMITER};
    use std::collections::{HashMap, VecDeque};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    /// One scripted stream event
    enum Step {
        Sample(StatsSnapshot),
        Malformed,
        End,
        /// Pend forever, like a runtime that stopped ticking
        Block,
    }

    struct ScriptedStream {
        steps: VecDeque<Step>,
    }

    #[async_trait]
    impl StatsStream for ScriptedStream {
        async fn next_sample(&mut self) -> Result<StatsSnapshot, StreamError> {
            match self.steps.pop_front() {
                Some(Step::Sample(sample)) => Ok(sample),
                Some(Step::Malformed) => Err(StreamError::Parse(
                    serde_json::from_str::<StatsSnapshot>("not json").unwrap_err(),
                )),
                Some(Step::End) => Err(StreamError::Ended),
                Some(Step::Block) | None => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    /// Source that hands out one scripted stream per `open` call and
    /// refuses further opens once the scripts run out.
    struct ScriptedSource {
        opens: Mutex<VecDeque<Vec<Step>>>,
    }

    impl ScriptedSource {
        fn new(opens: Vec<Vec<Step>>) -> Arc<Self> {
            Arc::new(Self {
                opens: Mutex::new(opens.into()),
            })
        }
    }

    #[async_trait]
    impl StatsSource for ScriptedSource {
        async fn open(&self, container_id: &str) -> Result<Box<dyn StatsStream>, ConnectError> {
            match self.opens.lock().unwrap().pop_front() {
                Some(steps) => Ok(Box::new(ScriptedStream {
                    steps: steps.into(),
                })),
                None => Err(ConnectError::ContainerNotFound {
                    id: container_id.to_string(),
                }),
            }
        }
    }

    /// A healthy snapshot deriving to CPU 80%, memory 50%.
    fn sample(read_second: u32) -> StatsSnapshot {
        StatsSnapshot {
            name: "abc123".to_string(),
            read: format!("2024-05-01T10:00:0{read_second}Z"),
            preread: format!("2024-05-01T10:00:0{}Z", read_second.saturating_sub(1)),
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 1_000_000_000 + u64::from(read_second) * 200_000_000,
                    percpu_usage: None,
                },
                system_cpu_usage: Some(9_000_000_000 + u64::from(read_second) * 1_000_000_000),
                online_cpus: Some(4),
            },
            precpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 800_000_000 + u64::from(read_second) * 200_000_000,
                    percpu_usage: None,
                },
                system_cpu_usage: Some(8_000_000_000 + u64::from(read_second) * 1_000_000_000),
                online_cpus: Some(4),
            },
            memory_stats: MemoryStats {
                usage: Some(536_870_912),
                limit: Some(1_073_741_824),
            },
            networks: HashMap::from([(
                "eth0".to_string(),
                NetworkStats {
                    rx_bytes: 2048,
                    tx_bytes: 1024,
                },
            )]),
        }
    }

    /// Config with timings shrunk so exhausted reconnects don't stall
    /// the test run.
    fn config(path: &Path) -> MonitorConfig {
        MonitorConfig {
            write_retry_delay: Duration::from_millis(1),
            reconnect: ReconnectConfig {
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                max_attempts: 2,
            },
            ..MonitorConfig::new("abc123", path)
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_three_samples_produce_header_and_ordered_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![vec![
            Step::Sample(sample(1)),
            Step::Sample(sample(2)),
            Step::Sample(sample(3)),
            Step::End,
        ]]);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = Monitor::new(source, config(&path));
        monitor.connect().await.unwrap();
        let rows = monitor.run(shutdown_rx).await.unwrap();

        assert_eq!(rows, 3);
        assert_eq!(monitor.state(), MonitorState::Stopped);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], COLUMNS.join(DELIMITER));
        for (i, line) in lines[1..].iter().enumerate() {
            let fields: Vec<&str> = line.split(DELIMITER).collect();
            assert_eq!(fields.len(), COLUMNS.len());
            assert_eq!(fields[0], "abc123");
            // Rows appear in production order.
            assert_eq!(fields[1], format!("2024-05-01T10:00:0{}Z", i + 1));
        }
    }

    #[tokio::test]
    async fn test_stream_end_leaves_exactly_n_well_formed_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![vec![
            Step::Sample(sample(1)),
            Step::Sample(sample(2)),
            Step::End,
        ]]);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = Monitor::new(source, config(&path));
        monitor.connect().await.unwrap();
        let rows = monitor.run(shutdown_rx).await.unwrap();

        assert_eq!(rows, 2);
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        for line in &lines[1..] {
            assert_eq!(line.split(DELIMITER).count(), COLUMNS.len());
        }
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped_and_loop_continues() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![vec![
            Step::Sample(sample(1)),
            Step::Malformed,
            Step::Sample(sample(2)),
            Step::End,
        ]]);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = Monitor::new(source, config(&path));
        monitor.connect().await.unwrap();
        let rows = monitor.run(shutdown_rx).await.unwrap();

        assert_eq!(rows, 2);
        assert_eq!(read_lines(&path).len(), 3);
    }

    #[tokio::test]
    async fn test_unusable_sample_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let mut broken = sample(2);
        broken.memory_stats.usage = None;
        let source = ScriptedSource::new(vec![vec![
            Step::Sample(sample(1)),
            Step::Sample(broken),
            Step::Sample(sample(3)),
            Step::End,
        ]]);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = Monitor::new(source, config(&path));
        monitor.connect().await.unwrap();
        let rows = monitor.run(shutdown_rx).await.unwrap();

        assert_eq!(rows, 2);
        assert_eq!(read_lines(&path).len(), 3);
    }

    #[tokio::test]
    async fn test_reconnect_resumes_sampling_after_stream_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![
            vec![Step::Sample(sample(1)), Step::End],
            vec![Step::Sample(sample(2)), Step::End],
        ]);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = Monitor::new(source, config(&path));
        monitor.connect().await.unwrap();
        let rows = monitor.run(shutdown_rx).await.unwrap();

        // One row per stream; the second End exhausts the reconnects.
        assert_eq!(rows, 2);
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(read_lines(&path).len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_a_blocked_loop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![vec![Step::Sample(sample(1)), Step::Block]]);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = Monitor::new(source, config(&path));
        monitor.connect().await.unwrap();
        let handle = monitor.start(shutdown_rx);

        // Let the first sample land, then interrupt the blocked pull.
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        let rows = handle.await.unwrap().unwrap();
        assert_eq!(rows, 1);
        assert_eq!(read_lines(&path).len(), 2);
    }

    #[tokio::test]
    async fn test_restart_appends_without_duplicating_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");

        for second in 1..=2 {
            let source =
                ScriptedSource::new(vec![vec![Step::Sample(sample(second)), Step::End]]);
            let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let mut monitor = Monitor::new(source, config(&path));
            monitor.connect().await.unwrap();
            monitor.run(shutdown_rx).await.unwrap();
        }

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMNS.join(DELIMITER));
        assert!(!lines[1..].iter().any(|l| *l == COLUMNS.join(DELIMITER)));
    }

    #[tokio::test]
    async fn test_connect_walks_the_states() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![vec![Step::End]]);

        let mut monitor = Monitor::new(source, config(&path));
        assert_eq!(monitor.state(), MonitorState::Disconnected);

        monitor.connect().await.unwrap();
        assert_eq!(monitor.state(), MonitorState::Connected);
    }

    #[tokio::test]
    async fn test_connect_failure_names_the_container() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![]);

        let mut monitor = Monitor::new(source, config(&path));
        let err = monitor.connect().await.unwrap_err();
        assert!(err.to_string().contains("abc123"));
        assert_eq!(monitor.state(), MonitorState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_before_connect_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc123.csv");
        let source = ScriptedSource::new(vec![]);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut monitor = Monitor::new(source, config(&path));
        assert!(monitor.run(shutdown_rx).await.is_err());
    }
}
