use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wan_i2v_proxy::engine::{ExecutionEngine, JobStatus};
use wan_i2v_proxy::input::ResolvedImage;
use wan_i2v_proxy::request::{AdapterPair, GenerationInput, GenerationRequest};
use wan_i2v_proxy::workflow::TemplateStore;
use wan_i2v_proxy::{ComfyUIClient, Config, Pipeline, WorkflowBuilder};

#[derive(Parser, Debug)]
#[command(name = "wanctl", about = "CLI for the Wan image-to-video proxy", version)]
struct Cli {
    /// Override COMFYUI_URL
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    /// Override WORKFLOWS_DIR
    #[arg(global = true, long, value_name = "DIR")]
    workflows_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a full generation against the engine and save the video
    Generate {
        #[command(flatten)]
        params: GenerationArgs,
        /// Output path for the video
        #[arg(long, value_name = "PATH", default_value = "video.mp4")]
        out: PathBuf,
    },
    /// Print the parameterized graph without submitting it
    Render {
        #[command(flatten)]
        params: GenerationArgs,
        /// Filename to reference as the input image
        #[arg(long, default_value = "input.jpg")]
        image_name: String,
    },
    /// Show the engine-reported state of a job
    Status {
        /// Prompt id returned by ComfyUI
        job_id: String,
    },
}

#[derive(Args, Debug, Clone)]
struct GenerationArgs {
    /// Image URL or local path
    #[arg(long)]
    image: String,
    /// Prompt text
    #[arg(long)]
    prompt: String,
    /// Seed
    #[arg(long)]
    seed: u64,
    /// CFG scale
    #[arg(long)]
    cfg: f64,
    /// Width
    #[arg(long)]
    width: u32,
    /// Height
    #[arg(long)]
    height: u32,
    /// Frame count
    #[arg(long, default_value_t = 81)]
    length: u32,
    /// Sampling steps
    #[arg(long, default_value_t = 10)]
    steps: u32,
    /// Adapter pair as HIGH:LOW[:HIGH_WEIGHT[:LOW_WEIGHT]] (repeatable, up to 3)
    #[arg(long = "lora", value_name = "PAIR", value_parser = parse_lora)]
    loras: Vec<AdapterPair>,
}

impl GenerationArgs {
    fn into_input(self) -> GenerationInput {
        GenerationInput {
            image_path: Some(self.image),
            image_base64: None,
            prompt: self.prompt,
            seed: self.seed,
            cfg: self.cfg,
            width: self.width,
            height: self.height,
            length: self.length,
            steps: self.steps,
            lora_pairs: self.loras,
        }
    }
}

fn parse_lora(src: &str) -> Result<AdapterPair, String> {
    let parts: Vec<&str> = src.split(':').collect();
    let weight = |i: usize| -> Result<f64, String> {
        match parts.get(i) {
            Some(w) => w.parse().map_err(|_| format!("invalid weight '{}'", w)),
            None => Ok(1.0),
        }
    };
    if parts.len() < 2 || parts.len() > 4 {
        return Err(format!("invalid --lora '{}', expected HIGH:LOW[:HW[:LW]]", src));
    }
    Ok(AdapterPair {
        high: parts[0].to_string(),
        low: parts[1].to_string(),
        high_weight: weight(2)?,
        low_weight: weight(3)?,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    // Load env and parse CLI
    Config::dotenv_load();
    let cli = Cli::parse();

    let mut conf = Config::new()?;
    if let Some(url) = cli.comfyui_url {
        conf.comfyui_url = url;
    }
    if let Some(dir) = cli.workflows_dir {
        conf.workflows_dir = dir;
    }

    match cli.command {
        Commands::Generate { params, out } => {
            let templates = Arc::new(TemplateStore::load_from_dir(&conf.workflows_dir)?);
            let (pipeline, _engine) = Pipeline::from_config(&conf, templates);
            match pipeline.generate(params.into_input()).await {
                Ok(artifact) => {
                    tokio::fs::write(&out, &artifact.bytes).await?;
                    println!("Saved {} ({} bytes, {})", out.display(), artifact.bytes.len(), artifact.mime);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Render { params, image_name } => {
            let templates = Arc::new(TemplateStore::load_from_dir(&conf.workflows_dir)?);
            let request = GenerationRequest::try_from(params.into_input())?;
            let workflow = WorkflowBuilder::new(templates).build(&request, ResolvedImage { filename: image_name })?;
            println!("{}", serde_json::to_string_pretty(&workflow.graph)?);
            Ok(())
        }
        Commands::Status { job_id } => {
            let client = ComfyUIClient::new(conf.comfyui_url.clone(), conf.output_dir.clone());
            let status = client.status(&job_id).await.map_err(|e| {
                eprintln!("Error: {}", e);
                e
            })?;
            match status {
                JobStatus::Pending => println!("pending"),
                JobStatus::Running => println!("running"),
                JobStatus::Failed { detail } => println!("failed: {}", detail),
                JobStatus::Succeeded => {
                    println!("succeeded");
                    let mut files = client.outputs(&job_id).await?;
                    files.sort();
                    for f in files {
                        println!("{}", f.display());
                    }
                }
            }
            Ok(())
        }
    }
}
