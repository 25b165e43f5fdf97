use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use cfaview::cfa::{CfaModel, Resolver, SplitEdgeId};
use cfaview::config::Config;
use cfaview::dispatch::{Dispatcher, FunctionGraphWorker, GraphUnit, WorkerReply};
use cfaview::render::{GraphSink, RenderOptions, RenderSession, ARG_WORKER, CFA_WORKER};
use cfaview::{cvlog, util, Result};

/// cfaview - inspect a verification report's control-flow automaton
#[derive(Parser, Debug)]
#[command(name = "cfaview")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CFAVIEW_DEBUG=1     Enable debug logging (alternative to --debug)\n    CFAVIEW_LOG=trace   Set the log level")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.cfaview/cfaview.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Resolve a displayed edge to its canonical CFA edge
    Edge {
        /// CFA model JSON
        model: PathBuf,
        /// Displayed source node id
        source: String,
        /// Displayed target node id
        target: String,
        /// Element id to fall back on for split-edge fragments
        #[arg(long)]
        element_id: Option<String>,
    },

    /// Resolve a split-edge fragment by its element id
    SplitEdge {
        model: PathBuf,
        /// Element id ending in `_<source>-<target>`
        element_id: String,
    },

    /// Describe a displayed node
    Node {
        model: PathBuf,
        /// Displayed node id
        id: String,
    },

    /// Stream the CFA through the worker pipeline, one function at a time
    Render {
        model: PathBuf,
        /// Treat the CFA as split across several subgraphs
        #[arg(long)]
        split: bool,
        /// Skip the ARG hand-off
        #[arg(long)]
        no_arg: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cfaview::log::init_with_debug(cli.debug);
    let config = Config::load()?;

    match cli.command {
        Command::Edge {
            model,
            source,
            target,
            element_id,
        } => run_edge(&model, &source, &target, element_id.as_deref()),
        Command::SplitEdge { model, element_id } => run_split_edge(&model, &element_id),
        Command::Node { model, id } => run_node(&model, &id),
        Command::Render {
            model,
            split,
            no_arg,
        } => {
            let options = RenderOptions {
                cfa_split: split || config.cfa_split,
                arg_tab_disabled: no_arg || config.arg_tab_disabled,
            };
            run_render(&model, &config, options)
        }
    }
}

fn load_resolver(path: &Path) -> Result<Resolver> {
    Resolver::from_model(CfaModel::load(path)?)
}

fn run_edge(path: &Path, source: &str, target: &str, element_id: Option<&str>) -> Result<()> {
    let resolver = load_resolver(path)?;
    let edge = match element_id {
        Some(element_id) => resolver.resolve_edge_or_split(source, target, element_id)?,
        None => resolver.resolve_edge(source, target)?,
    };
    match edge {
        Some(edge) => println!("{}", serde_json::to_string_pretty(edge)?),
        None => println!("No CFA edge for {} -> {}", source, target),
    }
    Ok(())
}

fn run_split_edge(path: &Path, element_id: &str) -> Result<()> {
    let resolver = load_resolver(path)?;
    let split = SplitEdgeId::parse(element_id)?;
    match resolver.graph().edge(split.source, split.target) {
        Some(edge) => println!("{}", serde_json::to_string_pretty(edge)?),
        None => println!("No CFA edge for {} -> {}", split.source, split.target),
    }
    Ok(())
}

fn run_node(path: &Path, id: &str) -> Result<()> {
    let resolver = load_resolver(path)?;
    println!("{}", resolver.resolve_node(id)?);
    Ok(())
}

/// Prints each subgraph as it arrives.
#[derive(Default)]
struct StdoutSink {
    shown: HashSet<u32>,
}

impl GraphSink for StdoutSink {
    fn contains(&self, id: u32) -> bool {
        self.shown.contains(&id)
    }

    fn render_graph(&mut self, unit: GraphUnit) -> Result<()> {
        println!("[{}] {}", unit.id, unit.func);
        println!("{}", unit.graph);
        self.shown.insert(unit.id);
        Ok(())
    }

    fn cfa_complete(&mut self, status: &str) {
        println!("cfa: {}", status);
    }

    fn arg_reply(&mut self, reply: WorkerReply) {
        if let WorkerReply::Status { status } = reply {
            println!("arg: {}", status);
        }
    }
}

fn run_render(path: &Path, config: &Config, options: RenderOptions) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let path = path.to_path_buf();
    let config = config.clone();

    rt.block_on(async move {
        let model = util::blocking(move || CfaModel::load(&path)).await?;
        let graph = cfaview::cfa::CanonicalGraph::new(model.nodes, model.edges)?;

        let dispatcher = Dispatcher::builder()
            .drain_retry(config.drain_retry())
            .worker(CFA_WORKER, FunctionGraphWorker::new(&graph)?)
            .worker(ARG_WORKER, FunctionGraphWorker::empty())
            .spawn()?;

        let mut sink = StdoutSink::default();
        let summary = RenderSession::new(&dispatcher, options)
            .run(&mut sink)
            .await?;
        cvlog!(
            "render finished: {} rendered, {} skipped, arg requested: {}",
            summary.rendered,
            summary.skipped,
            summary.arg_requested
        );
        dispatcher.shutdown();
        Ok::<_, cfaview::Error>(())
    })
}
