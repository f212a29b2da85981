mod cli;
mod config;
mod corpus;
mod embed;
mod error;
mod llm;
mod rag;
mod server;
mod sql;

use anyhow::Result;
use clap::Parser;
use cli::{ChatMode, Cli, Commands};
use corpus::Corpus;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    fmt().with_env_filter(EnvFilter::new(filter)).init();

    // 1. Resolve target directory
    let target_dir = match cli.target_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    // 2. Resolve global config path (overridable via --config)
    let global_cfg_path = cli.config.unwrap_or_else(config::global_config_path);

    // 3. Auto-create global config on first launch
    config::ensure_global_config(&global_cfg_path)?;

    // 4. Probe for project config in target dir (optional, never auto-created)
    let project_cfg_path = target_dir.join("sqlrag.toml");
    let project_cfg = project_cfg_path.exists().then_some(project_cfg_path.as_path());

    // 5. Load layered config
    let cfg = config::load(&global_cfg_path, project_cfg)?;
    let default_k = cfg.retrieval.default_k;

    match cli.command {
        Commands::Retrieve(args) => {
            let retriever = rag::build_retriever(&cfg, &target_dir).await?;
            rag::retriever::retrieve_cmd(
                &retriever,
                &args.query,
                args.k.unwrap_or(default_k),
                args.format,
            )
            .await?;
        }
        Commands::Ask(args) => {
            let pipeline = rag::build_pipeline(&cfg, &target_dir).await?;
            rag::pipeline::ask_cmd(
                &pipeline,
                &args.query,
                args.k.unwrap_or(default_k),
                !args.no_explain,
                args.format,
            )
            .await?;
        }
        Commands::Chat(args) => {
            let k = args.k.unwrap_or(default_k);
            match args.mode {
                ChatMode::Retrieval => {
                    let retriever = rag::build_retriever(&cfg, &target_dir).await?;
                    rag::pipeline::chat_cmd(&retriever, None, args.mode, k).await?;
                }
                ChatMode::Full => {
                    let pipeline = rag::build_pipeline(&cfg, &target_dir).await?;
                    rag::pipeline::chat_cmd(pipeline.retriever(), Some(&pipeline), args.mode, k)
                        .await?;
                }
            }
        }
        Commands::Validate(args) => {
            let outcome = sql::validate(&args.sql);
            if outcome.is_valid {
                println!("{}", outcome.formatted_sql);
            }
            println!(
                "Valid: {} ({})",
                if outcome.is_valid { "yes" } else { "no" },
                outcome.message
            );
        }
        Commands::Build(args) => {
            let paths = rag::corpus_paths(&cfg, &target_dir);
            let embedder = rag::load_embedder(&cfg).await?;
            let stats =
                corpus::builder::run(&args.records, &paths, &cfg.embed, embedder.as_ref()).await?;
            println!(
                "Done. {} records read: {} chunks indexed, {} dims.",
                stats.records, stats.chunks, stats.dimension
            );
            println!("Index  : {}", paths.index.display());
            println!("Chunks : {}", paths.chunks.display());
        }
        Commands::Stats => {
            let paths = rag::corpus_paths(&cfg, &target_dir);
            match Corpus::load(&paths) {
                Err(error::AppError::CorpusMissing(_)) => {
                    println!("No corpus found. Run `build` first.")
                }
                Err(e) => return Err(e.into()),
                Ok(corpus) => {
                    println!("Total chunks  : {}", corpus.len());
                    println!("Embedding dim : {}", corpus.dimension());
                    println!("Index file    : {}", paths.index.display());
                    println!("Chunk file    : {}", paths.chunks.display());
                }
            }
        }
        Commands::Serve(args) => {
            let pipeline = rag::build_pipeline(&cfg, &target_dir).await?;
            server::run_server(args, pipeline, default_k).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg.redacted())?);
        }
    }

    Ok(())
}
