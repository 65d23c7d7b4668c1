//! UCI engine adapter for the tactical evaluator interface.
//!
//! The engine runs as a child process. A writer task feeds its stdin and a
//! reader task forwards its stdout line by line; each evaluation request is a
//! task that takes exclusive use of the output lines for the duration of one
//! search.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chess_core::{position, Color, Evaluation, EvaluationBundle, MoveValues};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::evaluator::{EvaluationStream, EvaluatorError, TacticalEvaluator};
use crate::translate::translate;

/// Maximum number of lines to read before giving up on a handshake response.
pub const MAX_UCI_LINES: usize = 1000;

/// One `info` line carrying a scored principal variation.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoLine {
    pub depth: u32,
    /// 1-based line index; engines without MultiPV omit it.
    pub multipv: u32,
    pub score: Evaluation,
    pub pv: Vec<String>,
}

/// Parses a UCI info line.
///
/// Returns `None` for lines without depth or score (e.g. `currmove`
/// updates) and for bound scores, which are not exact.
pub fn parse_info_line(line: &str) -> Option<InfoLine> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.first() != Some(&"info") {
        return None;
    }

    let mut depth: Option<u32> = None;
    let mut multipv = 1;
    let mut cp: Option<i32> = None;
    let mut mate: Option<i32> = None;
    let mut pv = Vec::new();

    let mut i = 1;
    while i < parts.len() {
        match parts[i] {
            "depth" => {
                depth = parts.get(i + 1).and_then(|s| s.parse().ok());
                i += 1;
            }
            "multipv" => {
                multipv = parts.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(1);
                i += 1;
            }
            "score" => {
                match parts.get(i + 1) {
                    Some(&"cp") => cp = parts.get(i + 2).and_then(|s| s.parse().ok()),
                    Some(&"mate") => mate = parts.get(i + 2).and_then(|s| s.parse().ok()),
                    _ => {}
                }
                i += 2;
            }
            "lowerbound" | "upperbound" => return None,
            "pv" => {
                pv = parts[i + 1..].iter().map(|s| s.to_string()).collect();
                break;
            }
            _ => {}
        }
        i += 1;
    }

    Some(InfoLine {
        depth: depth?,
        multipv,
        score: Evaluation::from_uci_score(cp, mate)?,
        pv,
    })
}

/// Groups MultiPV info lines into one score map per depth.
///
/// A depth is complete once every expected line has arrived or the engine
/// moves on to a deeper iteration. Depths never go backwards.
#[derive(Debug)]
struct DepthCollector {
    expected: usize,
    depth: u32,
    scores: MoveValues,
    emitted: Option<u32>,
}

impl DepthCollector {
    fn new(expected: usize) -> Self {
        Self {
            expected: expected.max(1),
            depth: 0,
            scores: MoveValues::new(),
            emitted: None,
        }
    }

    fn push(&mut self, info: InfoLine) -> Vec<(u32, MoveValues)> {
        let mut done = Vec::new();
        let Some(mv) = info.pv.first() else {
            return done;
        };
        if self.emitted.is_some_and(|d| info.depth <= d) {
            return done;
        }
        if info.depth != self.depth {
            done.extend(self.take());
            self.depth = info.depth;
        }
        self.scores
            .insert(mv.clone(), info.score.to_centipawns() as f64);
        if self.scores.len() >= self.expected {
            done.extend(self.take());
        }
        done
    }

    /// Hands out the partial depth only when nothing was emitted yet.
    fn finish(&mut self) -> Option<(u32, MoveValues)> {
        if self.emitted.is_none() {
            self.take()
        } else {
            None
        }
    }

    fn take(&mut self) -> Option<(u32, MoveValues)> {
        if self.scores.is_empty() {
            return None;
        }
        self.emitted = Some(self.depth);
        Some((self.depth, std::mem::take(&mut self.scores)))
    }
}

struct Shared {
    commands: mpsc::UnboundedSender<String>,
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Bumped by every new request and every stop; a search whose
    /// generation is no longer current stops the engine.
    generation: AtomicU64,
    active: AtomicUsize,
}

impl Shared {
    fn send(&self, command: &str) -> Result<(), EvaluatorError> {
        debug!(command, "uci >");
        self.commands
            .send(command.to_string())
            .map_err(|_| EvaluatorError::InvalidResponse("engine closed unexpectedly".to_string()))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

struct Search {
    fen: String,
    turn: Color,
    multipv: usize,
    depth: Option<u32>,
    generation: u64,
}

/// A UCI engine (typically Stockfish) driven as a [`TacticalEvaluator`].
pub struct UciEvaluator {
    shared: Arc<Shared>,
    name: String,
    _process: Child,
}

impl UciEvaluator {
    /// Starts the engine at `engine_path` and completes the UCI handshake.
    ///
    /// # Errors
    ///
    /// - `EvaluatorError::NotFound` if the executable cannot be found
    /// - `EvaluatorError::Io` if the process fails to start
    /// - `EvaluatorError::InitFailed` if the handshake does not complete
    pub async fn spawn(engine_path: &str) -> Result<Self, EvaluatorError> {
        let mut process = Command::new(engine_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EvaluatorError::NotFound(engine_path.to_string()),
                _ => EvaluatorError::Io(e),
            })?;

        let mut stdin = process.stdin.take().ok_or(EvaluatorError::InitFailed)?;
        let stdout = process.stdout.take().ok_or(EvaluatorError::InitFailed)?;

        let (commands, mut command_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let line = format!("{}\n", command);
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if line_tx.send(line.trim().to_string()).is_err() {
                    break;
                }
            }
        });

        let send = |command: &str| {
            commands
                .send(command.to_string())
                .map_err(|_| EvaluatorError::InitFailed)
        };

        send("uci")?;
        let mut name = String::new();
        wait_for(&mut lines, |line| {
            if let Some(id) = line.strip_prefix("id name ") {
                name = id.to_string();
            }
            line == "uciok"
        })
        .await?;
        send("isready")?;
        wait_for(&mut lines, |line| line == "readyok").await?;

        let name = if name.is_empty() {
            "Unknown Engine".to_string()
        } else {
            name
        };
        debug!(engine = %name, "uci handshake complete");

        Ok(Self {
            shared: Arc::new(Shared {
                commands,
                lines: Mutex::new(lines),
                generation: AtomicU64::new(0),
                active: AtomicUsize::new(0),
            }),
            name,
            _process: process,
        })
    }

    /// Returns the engine's name as reported via UCI.
    pub fn name(&self) -> &str {
        &self.name
    }
}

async fn wait_for(
    lines: &mut mpsc::UnboundedReceiver<String>,
    mut done: impl FnMut(&str) -> bool,
) -> Result<(), EvaluatorError> {
    for _ in 0..MAX_UCI_LINES {
        match lines.recv().await {
            Some(line) if done(&line) => return Ok(()),
            Some(_) => {}
            None => return Err(EvaluatorError::InitFailed),
        }
    }
    Err(EvaluatorError::InitFailed)
}

impl TacticalEvaluator for UciEvaluator {
    fn is_ready(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst) == 0 && !self.shared.commands.is_closed()
    }

    fn stream_evaluations(
        &self,
        fen: &str,
        legal_move_count: usize,
        target_depth: Option<u32>,
    ) -> EvaluationStream {
        let (tx, stream) = EvaluationStream::channel(16);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let turn = match position::side_to_move(fen) {
            Ok(turn) => turn,
            Err(e) => {
                warn!(fen, error = %e, "not evaluating invalid position");
                return stream;
            }
        };
        if legal_move_count == 0 {
            return stream;
        }

        let search = Search {
            fen: fen.to_string(),
            turn,
            multipv: legal_move_count,
            depth: target_depth,
            generation,
        };
        let shared = Arc::clone(&self.shared);
        shared.active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            if let Err(e) = run_search(&shared, search, tx).await {
                warn!(error = %e, "engine search failed");
            }
            shared.active.fetch_sub(1, Ordering::SeqCst);
        });
        stream
    }

    fn stop_evaluation(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        // A stop with no search running is ignored by the engine.
        let _ = self.shared.send("stop");
    }
}

async fn run_search(
    shared: &Shared,
    search: Search,
    tx: mpsc::Sender<EvaluationBundle>,
) -> Result<(), EvaluatorError> {
    let mut lines = shared.lines.lock().await;
    if !shared.is_current(search.generation) {
        return Ok(());
    }

    shared.send(&format!("setoption name MultiPV value {}", search.multipv))?;
    shared.send(&format!("position fen {}", search.fen))?;
    match search.depth {
        Some(depth) => shared.send(&format!("go depth {}", depth))?,
        None => shared.send("go infinite")?,
    }

    let mut collector = DepthCollector::new(search.multipv);
    let mut stopped = false;
    while let Some(line) = lines.recv().await {
        if line.starts_with("bestmove") {
            if !stopped {
                if let Some((depth, scores)) = collector.finish() {
                    if let Some(bundle) = translate(&scores, search.turn, depth) {
                        let _ = tx.send(bundle).await;
                    }
                }
            }
            return Ok(());
        }
        if stopped {
            continue;
        }
        if !shared.is_current(search.generation) || tx.is_closed() {
            shared.send("stop")?;
            stopped = true;
            continue;
        }

        let Some(info) = parse_info_line(&line) else {
            continue;
        };
        for (depth, scores) in collector.push(info) {
            let Some(bundle) = translate(&scores, search.turn, depth) else {
                continue;
            };
            if tx.send(bundle).await.is_err() {
                shared.send("stop")?;
                stopped = true;
                break;
            }
        }
    }
    Err(EvaluatorError::InvalidResponse(
        "engine closed unexpectedly".to_string(),
    ))
}

impl Drop for UciEvaluator {
    fn drop(&mut self) {
        let _ = self.shared.send("quit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(depth: u32, multipv: u32, mv: &str, cp: i32) -> InfoLine {
        InfoLine {
            depth,
            multipv,
            score: Evaluation::Centipawns(cp),
            pv: vec![mv.to_string()],
        }
    }

    #[test]
    fn parses_multipv_line() {
        let line = "info depth 15 seldepth 20 multipv 2 score cp 35 nodes 50000 nps 1000 pv e2e4 e7e5 g1f3";
        let parsed = parse_info_line(line).unwrap();
        assert_eq!(parsed.depth, 15);
        assert_eq!(parsed.multipv, 2);
        assert_eq!(parsed.score, Evaluation::Centipawns(35));
        assert_eq!(parsed.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn parses_mate_and_negative_scores() {
        let mate = parse_info_line("info depth 12 score mate -3 pv d1h5 g6h5").unwrap();
        assert_eq!(mate.score, Evaluation::Mate(-3));
        assert_eq!(mate.multipv, 1);

        let negative = parse_info_line("info depth 10 score cp -150 pv e7e5").unwrap();
        assert_eq!(negative.score, Evaluation::Centipawns(-150));
    }

    #[test]
    fn skips_bounds_and_unscored_lines() {
        assert!(parse_info_line("info depth 9 score cp 20 lowerbound pv e2e4").is_none());
        assert!(parse_info_line("info depth 9 score cp 20 upperbound pv e2e4").is_none());
        assert!(parse_info_line("info depth 9 currmove e2e4 currmovenumber 1").is_none());
        assert!(parse_info_line("info score cp 35 pv e2e4").is_none());
        assert!(parse_info_line("bestmove e2e4").is_none());
        assert!(parse_info_line("info string NNUE enabled").is_none());
    }

    #[test]
    fn pv_is_optional() {
        let parsed = parse_info_line("info depth 5 score cp 0 nodes 1000").unwrap();
        assert!(parsed.pv.is_empty());
    }

    #[test]
    fn collector_emits_full_depths() {
        let mut collector = DepthCollector::new(2);
        assert!(collector.push(info(1, 1, "e2e4", 30)).is_empty());
        let done = collector.push(info(1, 2, "d2d4", 20));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, 1);
        assert_eq!(done[0].1.len(), 2);
        assert!(collector.finish().is_none());
    }

    #[test]
    fn collector_emits_on_deeper_iteration() {
        let mut collector = DepthCollector::new(3);
        collector.push(info(4, 1, "e2e4", 30));
        collector.push(info(4, 2, "d2d4", 20));
        let done = collector.push(info(5, 1, "e2e4", 31));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, 4);
        // Stale lines from an older depth are ignored.
        assert!(collector.push(info(4, 3, "c2c4", 10)).is_empty());
    }

    #[test]
    fn collector_scores_mates_on_centipawn_scale() {
        let mut collector = DepthCollector::new(1);
        let done = collector.push(InfoLine {
            depth: 3,
            multipv: 1,
            score: Evaluation::Mate(1),
            pv: vec!["a1a8".to_string()],
        });
        assert_eq!(done[0].1.get("a1a8"), Some(9_999.0));
    }

    #[test]
    fn collector_flushes_partial_depth_only_if_nothing_was_sent() {
        let mut collector = DepthCollector::new(3);
        collector.push(info(1, 1, "e2e4", 30));
        let partial = collector.finish().unwrap();
        assert_eq!(partial.1.len(), 1);
    }

    #[tokio::test]
    async fn missing_engine_is_reported() {
        let result = UciEvaluator::spawn("/nonexistent/path/to/stockfish").await;
        match result {
            Err(EvaluatorError::NotFound(path)) => {
                assert_eq!(path, "/nonexistent/path/to/stockfish");
            }
            Err(other) => panic!("expected NotFound, got {other}"),
            Ok(_) => panic!("expected NotFound"),
        }
    }
}
