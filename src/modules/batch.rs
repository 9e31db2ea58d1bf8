use std::time::Duration;
use tracing::{debug, warn};
use super::config::ExitPolicy;
use super::error::{ImportError, UpsertError};
use super::parser::Record;
use super::supabase::Upsert;
use super::utility::ProgressPrinter;

pub struct BatchOptions {
    pub table_name: String,
    pub conflict_key: String,
    pub batch_size: usize,
    pub batch_interval: u64,
}

#[derive(Debug)]
pub enum UpsertOutcome {
    Accepted(usize),
    Failed(UpsertError),
}

#[derive(Debug)]
pub struct BatchReport {
    // 1-based, as printed
    pub index: usize,
    pub size: usize,
    pub outcome: UpsertOutcome,
}

#[derive(Debug)]
pub struct RunSummary {
    pub total_records: usize,
    pub success_count: usize,
    pub batches: Vec<BatchReport>,
    pub failed_records: Vec<Record>,
}

impl RunSummary {
    pub fn failed_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b.outcome, UpsertOutcome::Failed(_)))
            .count()
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        100.0 * (self.total_records - self.success_count) as f64 / self.total_records as f64
    }

    // the run itself always completes; the policy decides if failed batches make it an error
    pub fn check(&self, policy: ExitPolicy) -> Result<(), ImportError> {
        let failed = self.failed_batches();
        if policy == ExitPolicy::Strict && failed > 0 {
            return Err(ImportError::BatchFailures {
                failed,
                total: self.batches.len(),
            });
        }
        Ok(())
    }
}

// consecutive, order preserving slices of at most `batch_size`
pub fn partition(records: &[Record], batch_size: usize) -> Vec<&[Record]> {
    records.chunks(batch_size.max(1)).collect()
}

pub struct BatchDriver {
    options: BatchOptions,
}

impl BatchDriver {

    pub fn new(options: BatchOptions) -> BatchDriver {
        BatchDriver { options }
    }

    pub fn batch_count(&self, record_count: usize) -> usize {
        let size = self.options.batch_size.max(1);
        (record_count + size - 1) / size
    }

    // upload all batches one after another; a failed batch is logged and skipped
    pub async fn run<U>(&self, records: Vec<Record>, upserter: &U) -> RunSummary
    where
        U: Upsert + Sync + ?Sized,
    {
        let total_batches = self.batch_count(records.len());
        let mut progress_printer = ProgressPrinter::new(total_batches);
        let mut summary = RunSummary {
            total_records: records.len(),
            success_count: 0,
            batches: Vec::with_capacity(total_batches),
            failed_records: Vec::new(),
        };

        for (i, batch) in partition(&records, self.options.batch_size).into_iter().enumerate() {
            let index = i + 1;

            if i > 0 && self.options.batch_interval > 0 {
                tokio::time::sleep(Duration::from_millis(self.options.batch_interval)).await;
            }

            debug!(batch = index, total = total_batches, size = batch.len(), "sending batch");
            let outcome = match upserter
                .upsert(&self.options.table_name, batch, &self.options.conflict_key)
                .await
            {
                Ok(accepted) => {
                    summary.success_count += accepted;
                    progress_printer.batch_done(index, batch.len());
                    UpsertOutcome::Accepted(accepted)
                }
                Err(error) => {
                    warn!(batch = index, error = %error, "batch failed");
                    progress_printer.batch_failed(index, &error);
                    summary.failed_records.extend_from_slice(batch);
                    UpsertOutcome::Failed(error)
                }
            };

            summary.batches.push(BatchReport {
                index,
                size: batch.len(),
                outcome,
            });
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::parser::parse;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;

    // records every call, fails the calls whose 1-based number is listed
    struct RecordingUpserter {
        calls: Mutex<Vec<(String, Vec<Record>, String)>>,
        failing_calls: Vec<usize>,
    }

    impl RecordingUpserter {
        fn new(failing_calls: Vec<usize>) -> RecordingUpserter {
            RecordingUpserter {
                calls: Mutex::new(Vec::new()),
                failing_calls,
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.calls.lock().unwrap().iter().map(|(_, b, _)| b.len()).collect()
        }
    }

    #[async_trait]
    impl Upsert for RecordingUpserter {
        async fn upsert(&self, table: &str, batch: &[Record], conflict_key: &str) -> Result<usize, UpsertError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((table.to_string(), batch.to_vec(), conflict_key.to_string()));
            if self.failing_calls.contains(&calls.len()) {
                return Err(UpsertError::Api {
                    status: 500,
                    message: "boom".to_string(),
                    code: None,
                    details: None,
                    hint: None,
                });
            }
            Ok(batch.len())
        }
    }

    fn numbered_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let mut fields = Map::new();
                fields.insert("id".to_string(), Value::from(i as u64));
                Record::from(fields)
            })
            .collect()
    }

    fn driver(batch_size: usize) -> BatchDriver {
        BatchDriver::new(BatchOptions {
            table_name: "users".to_string(),
            conflict_key: "id".to_string(),
            batch_size,
            batch_interval: 0,
        })
    }

    #[test]
    fn partition_is_exhaustive_and_ordered() {
        for n in 1..=30 {
            let records = numbered_records(n);
            for size in 1..=12 {
                let batches = partition(&records, size);

                assert_eq!(batches.len(), (n + size - 1) / size);
                let (last, full) = batches.split_last().unwrap();
                assert!(full.iter().all(|b| b.len() == size));
                assert!(!last.is_empty() && last.len() <= size);

                let joined: Vec<Record> = batches.concat();
                assert_eq!(joined, records);
            }
        }
    }

    #[tokio::test]
    async fn small_file_is_sent_in_one_batch() {
        let parsed = parse("email,name\na@x.com,Alice\nb@x.com,Bob").unwrap();
        let upserter = RecordingUpserter::new(vec![]);

        let summary = driver(50).run(parsed.records, &upserter).await;

        assert_eq!(upserter.batch_sizes(), vec![2]);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.failed_batches(), 0);

        let calls = upserter.calls.lock().unwrap();
        assert_eq!(calls[0].0, "users");
        assert_eq!(calls[0].2, "id");
        assert_eq!(calls[0].1[1].get("name"), Some(&json!("Bob")));
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_and_run_continues() {
        let records = numbered_records(125);
        let upserter = RecordingUpserter::new(vec![2]);

        let summary = driver(50).run(records, &upserter).await;

        assert_eq!(upserter.batch_sizes(), vec![50, 50, 25]);
        assert_eq!(summary.success_count, 75);
        assert_eq!(summary.total_records, 125);
        assert_eq!(summary.failed_batches(), 1);
        assert!(matches!(summary.batches[1].outcome, UpsertOutcome::Failed(_)));
        assert_eq!(summary.failed_records.len(), 50);
        assert_eq!(summary.failed_records[0].get("id"), Some(&json!(50)));
        assert!((summary.error_rate() - 40.0).abs() < f64::EPSILON);

        assert!(summary.check(ExitPolicy::Lenient).is_ok());
        assert!(matches!(
            summary.check(ExitPolicy::Strict),
            Err(ImportError::BatchFailures { failed: 1, total: 3 })
        ));
    }

    #[tokio::test]
    async fn every_batch_failing_counts_nothing() {
        let upserter = RecordingUpserter::new(vec![1, 2]);

        let summary = driver(3).run(numbered_records(5), &upserter).await;

        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.failed_batches(), 2);
        assert_eq!(summary.failed_records.len(), 5);
    }

    #[test]
    fn batch_count_rounds_up() {
        assert_eq!(driver(50).batch_count(125), 3);
        assert_eq!(driver(50).batch_count(100), 2);
        assert_eq!(driver(1).batch_count(7), 7);
        assert_eq!(driver(50).batch_count(0), 0);
    }
}
