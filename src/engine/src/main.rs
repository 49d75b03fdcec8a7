// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The command-surface binary (§6): a line-oriented stdin/stdout loop in
//! the UCI family, grounded on `tiltak`'s `tei.rs` read loop and
//! `aaholmes-chess`'s `uci.rs` command dispatch. Owns exactly one
//! `SearchCoordinator` and threads every `setoption` into the
//! `SearchSettings` it is given at the next `go`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mcts_core::{SearchCoordinator, SearchLimits, SearchSettings, TimeManager};
use nn::{Evaluator, RandomEvaluator};
use position::{ChessPosition, GamePosition};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// `--model-directory` is accepted and stored but never read from: the NN
/// runtime backing an `Evaluator` is an explicit Non-goal of this core
/// (§1), so the binary's only Evaluator is the random stand-in until a
/// real one is wired in by a caller of the library crates directly.
#[derive(Parser, Debug)]
#[command(name = "engine", about = "UCI-style parallel MCTS engine front end")]
struct Cli {
    /// Number of parallel search workers.
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Leaves gathered per worker before invoking the evaluator.
    #[arg(long, default_value_t = 8)]
    batch_size: usize,

    /// `off`/`error`/`warn`/`info`/`debug`/`trace`.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory a real model would be loaded from (unused placeholder).
    #[arg(long)]
    model_directory: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    engine_utils::logging::init(engine_utils::logging::parse_level(&cli.log_level))
        .context("failed to install logger")?;

    if let Some(dir) = &cli.model_directory {
        log::info!("model-directory `{dir}` given, but no NN runtime is wired in; using RandomEvaluator");
    }

    let mut settings = SearchSettings { threads: cli.threads, batch_size: cli.batch_size, ..SearchSettings::default() };
    let mut coordinator = new_coordinator(settings.clone());
    let mut calculating: Option<JoinHandle<SearchCoordinator>> = None;
    let stop = Arc::new(AtomicBool::new(false));

    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        let mut words = line.split_whitespace();

        let Some(command) = words.next() else { continue };

        // A naturally-completed `go` leaves its handle unjoined until the
        // next command arrives; fold it back in before anything else
        // touches `coordinator`; see `join_calculating`.
        if command != "go" {
            join_calculating(&mut coordinator, &mut calculating, &stop);
        }

        match command {
            "uci" => {
                println!("id name chess-mcts-engine");
                println!("id author generated");
                println!("option name Threads type spin default 2 min 1 max 256");
                println!("option name Batch_Size type spin default 8 min 1 max 1024");
                println!("option name Use_Transposition_Table type check default true");
                println!("option name Centi_CPuct_Init type spin default 250 min 0 max 1000");
                println!("option name Centi_Dirichlet_Epsilon type spin default 25 min 0 max 100");
                println!("option name Centi_Dirichlet_Alpha type spin default 20 min 0 max 1000");
                println!("option name Virtual_Loss type spin default 3 min 0 max 100");
                println!("option name Centi_Q_Value_Weight type spin default 100 min 0 max 100");
                println!("option name Allow_Early_Stopping type check default true");
                println!("option name Move_Overhead type spin default 0 min 0 max 60000");
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => coordinator.reset(),
            "setoption" => {
                if let Err(err) = apply_setoption(&mut settings, &line) {
                    log::warn!("{err}");
                    println!("info string {err}");
                    continue;
                }
                coordinator.update_settings(settings.clone());
            }
            "position" => {
                if let Err(err) = handle_position(&mut coordinator, words) {
                    log::warn!("{err}");
                    println!("info string {err}");
                }
            }
            "go" => {
                let mut limits = parse_go(words);
                limits.move_overhead_ms = settings.move_overhead_ms;
                stop.store(false, Ordering::Release);

                let stop_clone = stop.clone();
                let mut moved_coordinator = coordinator_placeholder(&mut coordinator, settings.clone());

                calculating = Some(thread::spawn(move || {
                    match moved_coordinator.search(limits, stop_clone) {
                        Ok(Some(report)) => {
                            let pv = report
                                .principal_variation
                                .iter()
                                .map(uci_move_string)
                                .collect::<Vec<_>>()
                                .join(" ");

                            println!(
                                "info depth {} nodes {} nps {:.0} score cp {} pv {}",
                                report.selection_depth,
                                report.nodes,
                                report.nodes_per_second,
                                (report.value * 100.0) as i64,
                                pv
                            );

                            match report.best_move {
                                Some(mv) => println!("bestmove {}", uci_move_string(&mv)),
                                None => println!("bestmove 0000"),
                            }
                        }
                        Ok(None) => println!("bestmove 0000"),
                        Err(err) => println!("info string search failed: {err}"),
                    }

                    io::stdout().flush().ok();
                    moved_coordinator
                }));
            }
            "stop" => {} // already joined above, before the dispatch
            "quit" => break, // already joined above, before the dispatch
            other => println!("info string unknown command `{other}`"),
        }

        io::stdout().flush().ok();
    }

    Ok(())
}

fn new_coordinator(settings: SearchSettings) -> SearchCoordinator {
    SearchCoordinator::new(settings, TimeManager::default(), || {
        Box::new(RandomEvaluator::default()) as Box<dyn Evaluator>
    })
}

/// Swaps a dummy coordinator in for the duration of a `go`, handing
/// ownership of the real one to the search thread (mirrors `tiltak`'s
/// `calculating_handle` pattern of moving the tree in and out of the
/// command loop rather than sharing it behind a lock).
fn coordinator_placeholder(coordinator: &mut SearchCoordinator, settings: SearchSettings) -> SearchCoordinator {
    std::mem::replace(coordinator, new_coordinator(settings))
}

/// Stops any in-flight search and folds its (now-updated) coordinator
/// back into the command loop's live one, so the next `go` sees this
/// search's tree/backed-up statistics rather than the placeholder left
/// behind when the search thread was spawned.
fn join_calculating(
    coordinator: &mut SearchCoordinator,
    calculating: &mut Option<JoinHandle<SearchCoordinator>>,
    stop: &Arc<AtomicBool>,
) {
    if let Some(handle) = calculating.take() {
        stop.store(true, Ordering::Release);
        if let Ok(finished) = handle.join() {
            *coordinator = finished;
        }
        stop.store(false, Ordering::Release);
    }
}

fn handle_position<'a>(coordinator: &mut SearchCoordinator, mut words: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut position = match words.next() {
        Some("startpos") => ChessPosition::new_game(),
        Some("fen") => {
            let fen_tokens: Vec<&str> = (&mut words).take_while(|&w| w != "moves").collect();
            let fen = fen_tokens.join(" ");
            ChessPosition::from_fen(&fen).map_err(|err| anyhow!("invalid fen: {err}"))?
        }
        Some(other) => return Err(anyhow!("expected `startpos` or `fen`, got `{other}`")),
        None => return Err(anyhow!("`position` requires `startpos` or `fen ...`")),
    };

    if let Some(token) = words.next() {
        if token != "moves" {
            return Err(anyhow!("expected `moves`, got `{token}`"));
        }

        for uci in words {
            position = position.do_uci_move(uci).map_err(|err| anyhow!("illegal move `{uci}`: {err}"))?;
        }
    }

    coordinator.set_position(position);
    Ok(())
}

fn parse_go<'a>(mut words: impl Iterator<Item = &'a str>) -> SearchLimits {
    let mut limits = SearchLimits::default();

    while let Some(word) = words.next() {
        match word {
            "wtime" => limits.wtime_ms = words.next().and_then(|v| v.parse().ok()),
            "btime" => limits.btime_ms = words.next().and_then(|v| v.parse().ok()),
            "winc" => limits.winc_ms = words.next().and_then(|v| v.parse().ok()),
            "binc" => limits.binc_ms = words.next().and_then(|v| v.parse().ok()),
            "movestogo" => limits.moves_to_go = words.next().and_then(|v| v.parse().ok()),
            "movetime" => limits.movetime_ms = words.next().and_then(|v| v.parse().ok()),
            "depth" => limits.depth = words.next().and_then(|v| v.parse().ok()),
            "nodes" => limits.nodes = words.next().and_then(|v| v.parse().ok()).unwrap_or(0),
            "infinite" => limits.infinite = true,
            "ponder" => limits.ponder = true,
            _ => {}
        }
    }

    limits
}

/// `name <Option> value <value>`, mirroring `aaholmes-chess`'s
/// `handle_setoption` parsing. Unknown option names are reported, not
/// silently ignored, so a misconfigured GUI is visible in the logs.
fn apply_setoption(settings: &mut SearchSettings, line: &str) -> Result<()> {
    let mut words = line.split_whitespace();
    words.next(); // "setoption"

    if words.next() != Some("name") {
        return Err(anyhow!("malformed setoption line: `{line}`"));
    }

    let mut name_parts = Vec::new();
    for word in &mut words {
        if word == "value" {
            break;
        }
        name_parts.push(word);
    }
    let name = name_parts.join(" ");
    let value = words.collect::<Vec<_>>().join(" ");

    match name.as_str() {
        "Threads" => settings.threads = value.parse().context("Threads")?,
        "Batch_Size" => settings.batch_size = value.parse().context("Batch_Size")?,
        "Use_Transposition_Table" => settings.use_transposition_table = parse_bool(&value)?,
        "Centi_CPuct_Init" => settings.cpuct_init = value.parse::<f32>().context("Centi_CPuct_Init")? / 100.0,
        "CPuct_Base" => settings.cpuct_base = value.parse().context("CPuct_Base")?,
        "Centi_Dirichlet_Epsilon" => {
            settings.dirichlet_epsilon = value.parse::<f32>().context("Centi_Dirichlet_Epsilon")? / 100.0
        }
        "Centi_Dirichlet_Alpha" => {
            settings.dirichlet_alpha = value.parse::<f32>().context("Centi_Dirichlet_Alpha")? / 100.0
        }
        "Centi_Node_Temperature" => {
            settings.node_policy_temperature = value.parse::<f32>().context("Centi_Node_Temperature")? / 100.0
        }
        "Virtual_Loss" => settings.virtual_loss = value.parse().context("Virtual_Loss")?,
        "Centi_Q_Value_Weight" => {
            settings.q_value_weight = value.parse::<f32>().context("Centi_Q_Value_Weight")? / 100.0
        }
        "Centi_Q_Thresh_Init" => settings.q_thresh_init = value.parse::<f32>().context("Centi_Q_Thresh_Init")? / 100.0,
        "Centi_Q_Thresh_Max" => settings.q_thresh_max = value.parse::<f32>().context("Centi_Q_Thresh_Max")? / 100.0,
        "Q_Thresh_Base" => settings.q_thresh_base = value.parse().context("Q_Thresh_Base")?,
        "Allow_Early_Stopping" => settings.allow_early_stopping = parse_bool(&value)?,
        "Move_Overhead" => settings.move_overhead_ms = value.parse().context("Move_Overhead")?,
        "Centi_Random_Move_Factor" => {
            settings.random_move_factor = value.parse::<f32>().context("Centi_Random_Move_Factor")? / 100.0
        }
        "MaxDepth" => settings.max_depth = value.parse().context("MaxDepth")?,
        other => return Err(anyhow!("unknown option `{other}`")),
    }

    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(anyhow!("expected `true`/`false`, got `{other}`")),
    }
}

fn uci_move_string(m: &position::Move) -> String {
    let mut out = format!("{}{}", m.from().expect("non-drop move"), m.to());
    if let Some(role) = m.promotion() {
        out.push(role.char());
    }
    out
}
