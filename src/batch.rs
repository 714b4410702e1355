use crate::archive::{build_archive, ArchiveCompressor, ArchiveParameters, ArchiveResult};
use crate::constants::{ESTIMATED_MIB_PER_WORKER, MIN_AVAILABLE_MEMORY_MIB};
use crate::error::{Result, SqueezeError};
use crate::processing::{transform, CompressionParameters, ImageCodec, ImageCrateCodec, TransformResult};
use crate::session::{BatchSession, SessionTotals};
use crate::source::SourceFile;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Cooperative stop signal, checked between items
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Progress callbacks. `on_item_started` may run on worker threads;
/// `on_item_finished` is called in input order.
pub trait BatchObserver: Sync {
    fn on_item_started(&self, _index: usize, _total: usize, _name: &str) {}

    fn on_item_finished(&self, _index: usize, _total: usize, _result: &TransformResult) {}
}

pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub total: usize,
    pub processed: usize,
    pub totals: SessionTotals,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives the image transform over a session's queue.
pub struct BatchRunner<C: ImageCodec = ImageCrateCodec> {
    codec: C,
    workers: usize,
}

impl BatchRunner<ImageCrateCodec> {
    pub fn with_default_codec(workers: usize) -> Result<Self> {
        Ok(Self::new(ImageCrateCodec::new()?, workers))
    }
}

impl<C: ImageCodec> BatchRunner<C> {
    /// `workers` of 1 processes strictly one item at a time.
    pub fn new(codec: C, workers: usize) -> Self {
        Self {
            codec,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn into_codec(self) -> C {
        self.codec
    }

    /// Transforms every queued file in order, replacing earlier results.
    ///
    /// Results are appended as items finish; index `i` of the results
    /// always belongs to index `i` of the queue. Cancellation stops the
    /// run between items and keeps what was completed.
    pub fn run(
        &self,
        session: &mut BatchSession,
        params: &CompressionParameters,
        cancel: &CancellationToken,
        observer: &dyn BatchObserver,
    ) -> Result<BatchReport> {
        let _guard = session.begin_batch()?;
        if session.files().is_empty() {
            return Err(SqueezeError::NoInput);
        }

        let pool = if self.workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.workers)
                    .build()
                    .map_err(|e| SqueezeError::WorkerPool(e.to_string()))?,
            )
        } else {
            None
        };

        let start_time = Instant::now();
        session.reset_results();
        let (files, mut log) = session.run_parts();
        let total = files.len();
        let mut processed = 0;
        let mut status = BatchStatus::Completed;

        tracing::info!(total, workers = self.workers, "batch started");

        for (chunk_index, chunk) in files.chunks(self.workers).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(processed, total, "batch cancelled");
                status = BatchStatus::Cancelled;
                break;
            }

            let first_index = chunk_index * self.workers;
            let results = match &pool {
                Some(pool) => self.transform_chunk(pool, chunk, first_index, total, params, observer),
                None => chunk
                    .iter()
                    .enumerate()
                    .map(|(offset, file)| {
                        observer.on_item_started(first_index + offset, total, file.name());
                        transform(file, params, &self.codec)
                    })
                    .collect(),
            };

            for (offset, result) in results.into_iter().enumerate() {
                observer.on_item_finished(first_index + offset, total, &result);
                log.push(result);
                processed += 1;
            }
        }

        session.finalize_totals();
        let totals = session.totals();
        let elapsed = start_time.elapsed();

        tracing::info!(
            processed,
            succeeded = totals.succeeded,
            failed = totals.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "batch finished"
        );

        Ok(BatchReport {
            status,
            total,
            processed,
            totals,
            elapsed,
        })
    }

    fn transform_chunk(
        &self,
        pool: &rayon::ThreadPool,
        chunk: &[SourceFile],
        first_index: usize,
        total: usize,
        params: &CompressionParameters,
        observer: &dyn BatchObserver,
    ) -> Vec<TransformResult> {
        // Indexed parallel iterators collect in input order.
        pool.install(|| {
            chunk
                .par_iter()
                .enumerate()
                .map(|(offset, file)| {
                    observer.on_item_started(first_index + offset, total, file.name());
                    transform(file, params, &self.codec)
                })
                .collect()
        })
    }
}

/// What the bulk download step hands back
#[derive(Debug, Clone)]
pub enum Package {
    Single(SourceFile),
    Archive(ArchiveResult),
}

/// Packages successful outputs: one file as-is, several as a ZIP.
/// Failed items are left out.
pub fn package_results(
    results: &[TransformResult],
    archive_name: &str,
    compressor: &mut dyn ArchiveCompressor,
) -> Result<Package> {
    let mut outputs = unique_outputs(results);

    match outputs.len() {
        0 => Err(SqueezeError::NoInput),
        1 => Ok(Package::Single(outputs.remove(0))),
        _ => {
            let params = ArchiveParameters::new(None, Some(archive_name.to_string()), None, false)?;
            Ok(Package::Archive(build_archive(&outputs, &params, compressor)?))
        }
    }
}

/// Successful outputs in input order, renamed where two share a name.
///
/// A repeated name gets a counter before its extension (`x_compressed_1.png`),
/// skipping any name already produced by another output.
pub fn unique_outputs(results: &[TransformResult]) -> Vec<SourceFile> {
    let outputs: Vec<&SourceFile> = results.iter().filter_map(TransformResult::output).collect();
    let original_names: HashSet<&str> = outputs.iter().map(|f| f.name()).collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(outputs.len());

    outputs
        .into_iter()
        .map(|file| {
            if taken.insert(file.name().to_string()) {
                return file.clone();
            }
            let path = Path::new(file.name());
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let extension = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();

            let mut counter = 1;
            let renamed = loop {
                let candidate = format!("{}_{}{}", stem, counter, extension);
                if !taken.contains(&candidate) && !original_names.contains(candidate.as_str()) {
                    break candidate;
                }
                counter += 1;
            };
            tracing::warn!(from = file.name(), to = %renamed, "output name already used, renaming");
            taken.insert(renamed.clone());
            file.clone().with_name(renamed)
        })
        .collect()
}

/// Default worker count for `file_count` items, bounded by CPU count and
/// by the memory currently available.
pub fn recommended_workers(file_count: usize) -> usize {
    let baseline = num_cpus::get().min(file_count).max(1);

    let mut sys =
        System::new_with_specifics(RefreshKind::new().with_memory(MemoryRefreshKind::new()));
    sys.refresh_memory();
    let available_mem_mib = sys.available_memory() / (1024 * 1024);
    let mem_cap = (available_mem_mib.saturating_sub(MIN_AVAILABLE_MEMORY_MIB)
        / ESTIMATED_MIB_PER_WORKER)
        .clamp(1, baseline as u64) as usize;

    baseline.min(mem_cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZipCompressor;
    use crate::formats::OutputFormat;
    use crate::processing::{DecodedImage, TransformFailure};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Decodes anything starting with `ok`, returning a fixed 4x4 image,
    /// and encodes to the file's pixel count in bytes.
    struct FakeCodec;

    impl ImageCodec for FakeCodec {
        fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
            if bytes.starts_with(b"ok") {
                Ok(DecodedImage {
                    image: DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
                    format: ImageFormat::Png,
                })
            } else {
                Err(SqueezeError::UnsupportedFormat("fake".to_string()))
            }
        }

        fn encode(&self, image: &DynamicImage, _: ImageFormat, _: &CompressionParameters) -> Result<Vec<u8>> {
            Ok(vec![1u8; (image.width() * image.height()) as usize])
        }
    }

    #[derive(Default)]
    struct Recorder {
        finished: Mutex<Vec<(usize, String, bool)>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl BatchObserver for Recorder {
        fn on_item_finished(&self, index: usize, _total: usize, result: &TransformResult) {
            self.finished.lock().unwrap().push((
                index,
                result.original_name().to_string(),
                result.is_success(),
            ));
            if let Some((after, token)) = &self.cancel_after {
                if index + 1 >= *after {
                    token.cancel();
                }
            }
        }
    }

    fn queued(names_and_bodies: &[(&str, &[u8])]) -> BatchSession {
        let mut session = BatchSession::images();
        session
            .add_files(
                names_and_bodies
                    .iter()
                    .map(|(name, body)| SourceFile::with_mime(*name, "image/png", body.to_vec())),
            )
            .unwrap();
        session
    }

    #[test]
    fn test_failure_in_middle_keeps_order() {
        let mut session = queued(&[("1.png", b"ok-one"), ("2.png", b"bad"), ("3.png", b"ok-three")]);
        let runner = BatchRunner::new(FakeCodec, 1);
        let recorder = Recorder::default();

        let report = runner
            .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &recorder)
            .unwrap();

        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(report.processed, 3);
        let results = session.results();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].original_name(), "1.png");
        assert!(matches!(
            &results[1],
            TransformResult::Failure { reason: TransformFailure::Decode(_), .. }
        ));
        assert!(results[1].output().is_none());
        assert_eq!(results[2].original_name(), "3.png");

        let finished = recorder.finished.lock().unwrap();
        let order: Vec<usize> = finished.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_totals_match_successful_outputs() {
        let mut session = queued(&[("a.png", b"ok-a"), ("b.png", b"nope"), ("c.png", b"ok-c")]);
        let runner = BatchRunner::new(FakeCodec, 1);
        let report = runner
            .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &NoopObserver)
            .unwrap();

        let sum: u64 = session
            .results()
            .iter()
            .filter_map(TransformResult::transformed_size)
            .sum();
        assert_eq!(sum, 32);
        assert_eq!(report.totals.transformed_bytes, sum);
        assert_eq!(session.totals().transformed_bytes, sum);
        assert_eq!(report.totals.failed, 1);

        for (result, file) in session.results().iter().zip(session.files()) {
            assert_eq!(result.original_size(), file.size());
        }
    }

    #[test]
    fn test_parallel_run_preserves_input_order() {
        let bodies: Vec<(String, Vec<u8>)> = (0..10)
            .map(|i| {
                let body = if i % 3 == 0 { b"broken".to_vec() } else { b"ok".to_vec() };
                (format!("{}.png", i), [body, vec![i as u8]].concat())
            })
            .collect();
        let named: Vec<(&str, &[u8])> = bodies.iter().map(|(n, b)| (n.as_str(), b.as_slice())).collect();
        let mut session = queued(&named);

        let runner = BatchRunner::new(FakeCodec, 4);
        let report = runner
            .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &NoopObserver)
            .unwrap();

        assert_eq!(report.processed, 10);
        for (i, result) in session.results().iter().enumerate() {
            assert_eq!(result.original_name(), format!("{}.png", i));
            assert_eq!(result.is_success(), i % 3 != 0);
        }
    }

    #[test]
    fn test_cancellation_keeps_completed_results() {
        let mut session = queued(&[("a.png", b"ok-a"), ("b.png", b"ok-b"), ("c.png", b"ok-c")]);
        let token = CancellationToken::new();
        let recorder = Recorder {
            cancel_after: Some((1, token.clone())),
            ..Recorder::default()
        };

        let report = BatchRunner::new(FakeCodec, 1)
            .run(&mut session, &CompressionParameters::default(), &token, &recorder)
            .unwrap();

        assert_eq!(report.status, BatchStatus::Cancelled);
        assert_eq!(report.processed, 1);
        assert_eq!(session.results().len(), 1);
        assert_eq!(session.totals().succeeded, 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_second_run_rejected_while_busy() {
        let mut session = queued(&[("a.png", b"ok-a")]);
        let guard = session.begin_batch().unwrap();

        let result = BatchRunner::new(FakeCodec, 1).run(
            &mut session,
            &CompressionParameters::default(),
            &CancellationToken::new(),
            &NoopObserver,
        );
        assert!(matches!(result, Err(SqueezeError::BatchInProgress)));
        assert!(session.results().is_empty());

        drop(guard);
        assert!(BatchRunner::new(FakeCodec, 1)
            .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &NoopObserver)
            .is_ok());
    }

    #[test]
    fn test_empty_queue_is_no_input() {
        let mut session = BatchSession::images();
        let result = BatchRunner::new(FakeCodec, 1).run(
            &mut session,
            &CompressionParameters::default(),
            &CancellationToken::new(),
            &NoopObserver,
        );
        assert!(matches!(result, Err(SqueezeError::NoInput)));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_rerun_replaces_results() {
        let mut session = queued(&[("a.png", b"ok-a"), ("b.png", b"ok-b")]);
        let runner = BatchRunner::new(FakeCodec, 1);
        for _ in 0..2 {
            runner
                .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &NoopObserver)
                .unwrap();
        }
        assert_eq!(session.results().len(), 2);
        assert_eq!(session.totals().transformed_bytes, 32);
    }

    #[test]
    fn test_package_results() {
        let mut session = queued(&[("a.png", b"ok-a"), ("b.png", b"bad"), ("c.png", b"ok-c")]);
        BatchRunner::new(FakeCodec, 1)
            .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &NoopObserver)
            .unwrap();

        match package_results(session.results(), "compressed_images", &mut ZipCompressor::new()).unwrap() {
            Package::Archive(archive) => {
                assert_eq!(archive.name, "compressed_images.zip");
                assert_eq!(archive.manifest.file_count, 2);
                let zip = zip::ZipArchive::new(Cursor::new(&archive.bytes)).unwrap();
                let mut names: Vec<_> = zip.file_names().map(str::to_string).collect();
                names.sort();
                assert_eq!(names, vec!["a_compressed.png", "c_compressed.png"]);
            }
            Package::Single(_) => panic!("expected an archive for two outputs"),
        }

        let single = &session.results()[..1];
        assert!(matches!(
            package_results(single, "x", &mut ZipCompressor::new()).unwrap(),
            Package::Single(file) if file.name() == "a_compressed.png"
        ));

        let failed_only = &session.results()[1..2];
        assert!(matches!(
            package_results(failed_only, "x", &mut ZipCompressor::new()),
            Err(SqueezeError::NoInput)
        ));
    }

    #[test]
    fn test_colliding_output_names_are_all_packaged() {
        // Same name, different sizes: intake keeps all three
        let mut session = queued(&[("x.png", b"ok-1"), ("x.png", b"ok-22"), ("x.png", b"ok-333")]);
        assert_eq!(session.files().len(), 3);
        BatchRunner::new(FakeCodec, 1)
            .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &NoopObserver)
            .unwrap();

        let names: Vec<String> = unique_outputs(session.results())
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, ["x_compressed.png", "x_compressed_1.png", "x_compressed_2.png"]);

        match package_results(session.results(), "bundle", &mut ZipCompressor::new()).unwrap() {
            Package::Archive(archive) => {
                assert_eq!(archive.manifest.file_count, 3);
                let zip = zip::ZipArchive::new(Cursor::new(&archive.bytes)).unwrap();
                assert_eq!(zip.len(), 3);
            }
            Package::Single(_) => panic!("expected an archive for three outputs"),
        }
    }

    #[test]
    fn test_unique_outputs_keeps_distinct_names() {
        let mut session = queued(&[("a.png", b"ok-a"), ("b.png", b"bad"), ("c.png", b"ok-c")]);
        BatchRunner::new(FakeCodec, 1)
            .run(&mut session, &CompressionParameters::default(), &CancellationToken::new(), &NoopObserver)
            .unwrap();

        let outputs = unique_outputs(session.results());
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].name(), "a_compressed.png");
        assert_eq!(outputs[1].name(), "c_compressed.png");
        assert_eq!(outputs[0].id(), session.results()[0].output().unwrap().id());
    }

    #[test]
    fn test_real_codec_batch() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, image::Rgb([9, 99, 199])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let mut session = BatchSession::images();
        session
            .add_files(vec![SourceFile::new("photo.png", png)])
            .unwrap();

        let params = CompressionParameters::new(Some(70), Some(32), OutputFormat::Jpeg).unwrap();
        let runner = BatchRunner::with_default_codec(1).unwrap();
        let report = runner
            .run(&mut session, &params, &CancellationToken::new(), &NoopObserver)
            .unwrap();

        assert_eq!(report.totals.succeeded, 1);
        let output = session.results()[0].output().unwrap();
        assert_eq!(output.name(), "photo_compressed.jpg");
        assert_eq!(image::load_from_memory(output.bytes()).unwrap().width(), 32);
    }

    #[test]
    fn test_recommended_workers_bounds() {
        assert_eq!(recommended_workers(1), 1);
        let workers = recommended_workers(1000);
        assert!(workers >= 1 && workers <= num_cpus::get());
    }
}
