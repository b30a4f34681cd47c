// THEORY:
// The image/depth sweep has no cross-image dependency, so when inference
// is cheap relative to the corpus size it can fan out across a bounded
// worker pool. This module is the parallel counterpart of the sequential
// sweep in `processor`: same per-image unit of work, same message handoff
// to the same supervisor, different scheduling.
//
// Two rules keep it equivalent to the sequential sweep from the outside:
// 1.  Results carry their corpus index, and the supervisor normalizes to
//     corpus order before summaries are built, so completion order never
//     leaks into persisted artifacts.
// 2.  Each worker checks the shared deadline before picking up an image,
//     so an expired budget stops the pool from taking new work while
//     results already produced stay on the channel.

use crate::processor::{SweepContext, SweepMessage, sweep_image};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// One image's outcome on the pool: rows, a deadline skip, or a failure.
type ImageOutcome = std::result::Result<Option<(usize, Vec<(u32, crate::result_manager::DepthResult)>)>, String>;

/// Image-parallel sweep over the corpus with at most `workers` in-flight
/// images. Sends the same message protocol as the sequential sweep.
pub(crate) async fn run(
    ctx: Arc<SweepContext>,
    corpus: Arc<Vec<PathBuf>>,
    deadline: Instant,
    tx: UnboundedSender<SweepMessage>,
    workers: usize,
) {
    let mut outcomes = futures::stream::iter(corpus.iter().cloned().enumerate().map(
        |(corpus_index, path)| {
            let ctx = Arc::clone(&ctx);
            tokio::task::spawn_blocking(move || -> ImageOutcome {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                sweep_image(&ctx, &path).map(|rows| Some((corpus_index, rows)))
            })
        },
    ))
    .buffer_unordered(workers.max(1));

    let mut deadline_hit = false;
    while let Some(joined) = outcomes.next().await {
        match joined {
            Ok(Ok(Some((corpus_index, rows)))) => {
                for (depth, result) in rows {
                    let sent = tx.send(SweepMessage::Result {
                        corpus_index,
                        depth,
                        result,
                    });
                    if sent.is_err() {
                        return; // supervisor already gave up on us
                    }
                }
            }
            Ok(Ok(None)) => deadline_hit = true,
            Ok(Err(reason)) => {
                let _ = tx.send(SweepMessage::Failed(reason));
                return;
            }
            Err(join_error) => {
                let _ = tx.send(SweepMessage::Failed(join_error.to_string()));
                return;
            }
        }
    }
    let _ = tx.send(if deadline_hit {
        SweepMessage::TimedOut
    } else {
        SweepMessage::Finished
    });
}
