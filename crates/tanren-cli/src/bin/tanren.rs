//! CLI for the Tanren finetuning pipeline

use clap::Parser;
use tanren_cli::{commands, error::CliError};

#[derive(Parser)]
#[command(name = "tanren")]
#[command(about = "CLI for the Tanren finetuning pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum DatasetCommands {
    /// Fetch an instruction dataset from HuggingFace
    Fetch {
        /// HuggingFace dataset repository ID
        #[arg(default_value = "databricks/databricks-dolly-15k")]
        repo_id: String,

        /// Dataset name (defaults to the repository name)
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Dataset split to fetch
        #[arg(long, short = 's', default_value = "train")]
        split: String,

        /// Force re-download even if the dataset exists
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// List all fetched datasets
    List,

    /// Show information about a dataset
    Show {
        /// Dataset name
        name: String,
    },

    /// Remove a dataset and its files
    Remove {
        /// Dataset name
        name: String,
    },
}

#[derive(clap::Subcommand)]
enum LoraCommands {
    /// List all trained adapters
    List,

    /// Show information about an adapter
    Show {
        /// Adapter name
        name: String,
    },

    /// Remove an adapter from the registry
    Remove {
        /// Adapter name
        name: String,

        /// Keep the files (only remove from registry)
        #[arg(long)]
        keep_files: bool,
    },
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Initialize a new Tanren project
    Init,
    /// Download base models from HuggingFace
    Setup {
        /// List downloaded models
        #[arg(long)]
        list: bool,
        /// Force re-download even if files exist
        #[arg(long, short)]
        force: bool,
        /// Custom name for the model (defaults to the repository name)
        #[arg(value_name = "NAME")]
        name: Option<String>,
        /// HuggingFace repository ID (e.g., meta-llama/Meta-Llama-3-8B-Instruct)
        #[arg(value_name = "REPO_ID")]
        repo_id: Option<String>,
    },
    /// Instruction dataset management
    Dataset {
        #[command(subcommand)]
        command: Option<DatasetCommands>,
    },
    /// LoRA adapter management
    Lora {
        #[command(subcommand)]
        command: Option<LoraCommands>,
    },
    /// Finetune a LoRA adapter on an instruction dataset
    Train {
        /// Base model (registered name or HuggingFace repo ID)
        #[arg(long, short = 'm', default_value = "meta-llama/Meta-Llama-3-8B-Instruct")]
        model: String,

        /// Dataset (registered name or HuggingFace dataset repo ID)
        #[arg(long, short = 'd', default_value = "databricks/databricks-dolly-15k")]
        dataset: String,

        /// Name the trained adapter is registered under
        #[arg(long, short = 'n', default_value = "final_model")]
        name: String,

        /// Output directory for checkpoints and the final adapter
        #[arg(long, short = 'o', default_value = "./results")]
        output: String,

        /// Number of training epochs
        #[arg(long, short = 'e', default_value = "1")]
        epochs: usize,

        /// Batch size per device
        #[arg(long, default_value = "4")]
        batch_size: usize,

        /// Learning rate
        #[arg(long, default_value = "2e-4")]
        learning_rate: f64,

        /// LoRA rank
        #[arg(long, default_value = "64")]
        rank: usize,

        /// LoRA alpha
        #[arg(long, default_value = "16")]
        alpha: f32,

        /// Cap on the number of training samples (0 uses the whole dataset)
        #[arg(long, default_value = "1000")]
        sample_limit: usize,

        /// Hard cap on optimizer steps (0 means no cap)
        #[arg(long, default_value = "0")]
        max_steps: usize,

        /// Keep the base weights in full precision instead of 4-bit
        #[arg(long)]
        no_quantize: bool,

        /// Force CPU even when an accelerator is available
        #[arg(long)]
        cpu: bool,

        /// Run a short generation after training
        #[arg(long)]
        test: bool,

        /// Target GCS bucket for the trained adapter
        #[arg(long)]
        bucket: Option<String>,

        /// Object key prefix inside the bucket
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Upload a trained adapter directory to GCS
    Upload {
        /// Directory to upload
        #[arg(default_value = "./results/final_model")]
        dir: String,

        /// Target GCS bucket (falls back to the config)
        #[arg(long, short = 'b')]
        bucket: Option<String>,

        /// Object key prefix inside the bucket
        #[arg(long, short = 'p')]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Init) => {
            commands::run_init().await?;
        }
        Some(Commands::Setup {
            list,
            force,
            name,
            repo_id,
        }) => {
            commands::run_setup(*list, *force, name.clone(), repo_id.clone()).await?;
        }
        Some(Commands::Dataset { command }) => match command {
            Some(DatasetCommands::Fetch {
                repo_id,
                name,
                split,
                force,
            }) => {
                commands::dataset_fetch(repo_id, name.clone(), split, *force).await?;
            }
            Some(DatasetCommands::List) => {
                commands::dataset_list().await?;
            }
            Some(DatasetCommands::Show { name }) => {
                commands::dataset_show(name).await?;
            }
            Some(DatasetCommands::Remove { name }) => {
                commands::dataset_remove(name).await?;
            }
            None => {
                // Show help when no subcommand is provided
                println!("Instruction dataset management commands\n");
                println!("Use --help for more information");
            }
        },
        Some(Commands::Lora { command }) => match command {
            Some(LoraCommands::List) => {
                commands::lora_list().await?;
            }
            Some(LoraCommands::Show { name }) => {
                commands::lora_show(name).await?;
            }
            Some(LoraCommands::Remove { name, keep_files }) => {
                commands::lora_remove(name, *keep_files).await?;
            }
            None => {
                // Show help when no subcommand is provided
                println!("LoRA adapter management commands\n");
                println!("Use --help for more information");
            }
        },
        Some(Commands::Train {
            model,
            dataset,
            name,
            output,
            epochs,
            batch_size,
            learning_rate,
            rank,
            alpha,
            sample_limit,
            max_steps,
            no_quantize,
            cpu,
            test,
            bucket,
            prefix,
        }) => {
            commands::run_train(commands::TrainOptions {
                model: model.clone(),
                dataset: dataset.clone(),
                name: name.clone(),
                output: output.clone(),
                epochs: *epochs,
                batch_size: *batch_size,
                learning_rate: *learning_rate,
                rank: *rank,
                alpha: *alpha,
                sample_limit: *sample_limit,
                max_steps: *max_steps,
                no_quantize: *no_quantize,
                cpu: *cpu,
                test: *test,
                bucket: bucket.clone(),
                prefix: prefix.clone(),
            })
            .await?;
        }
        Some(Commands::Upload {
            dir,
            bucket,
            prefix,
        }) => {
            commands::run_upload(dir, bucket.clone(), prefix.clone()).await?;
        }
        None => {
            println!("Tanren finetuning pipeline");
            println!("Use --help for more information");
        }
    }

    Ok(())
}
