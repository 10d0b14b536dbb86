//! `genrelay` command-line interface.
//!
//! Exit codes: 0 on success, 2 when the API key was rejected, 1 otherwise.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use genrelay_core::{
    Capability, GeneratedContent, InlineBlob, InvocationError, PcmAudio, RecipeBook, RequestSpec,
    RequestSpecBuilder,
};
use genrelay_runtime::{CancellationToken, ProviderRegistry, ResilientInvoker, RuntimeConfig};

const EXIT_FAILURE: u8 = 1;
const EXIT_CREDENTIAL_INVALID: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "genrelay", version, about = "Resilient generative-AI calls with retry and model fallback")]
struct Cli {
    /// YAML runtime configuration
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log retries and fallbacks to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model to try, in order; repeat for fallbacks (default: configured catalog)
    #[arg(long = "model", value_name = "MODEL")]
    models: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate text
    Text {
        prompt: String,

        #[command(flatten)]
        models: ModelArgs,

        #[arg(long)]
        temperature: Option<f32>,

        /// JSON schema file for structured output
        #[arg(long, value_name = "FILE")]
        schema: Option<PathBuf>,

        /// Pretty-print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate an image
    Image {
        prompt: String,

        /// Reference image sent ahead of the prompt
        #[arg(long = "reference", value_name = "FILE")]
        references: Vec<PathBuf>,

        #[arg(long)]
        aspect_ratio: Option<String>,

        #[command(flatten)]
        models: ModelArgs,

        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Synthesize speech to a WAV file
    Speak {
        text: String,

        #[arg(long)]
        voice: Option<String>,

        #[command(flatten)]
        models: ModelArgs,

        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Run a named recipe from a YAML or JSON recipe book
    Recipe {
        file: PathBuf,

        name: String,

        /// Template variable as key=value
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Output file for image or audio recipes
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Print the configured model catalog
    Models,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => match error.downcast_ref::<InvocationError>() {
            Some(failure) => {
                eprintln!("{}", failure.message);
                if failure.is_credential_invalid() {
                    ExitCode::from(EXIT_CREDENTIAL_INVALID)
                } else {
                    ExitCode::from(EXIT_FAILURE)
                }
            }
            None => {
                eprintln!("Error: {:#}", error);
                ExitCode::from(EXIT_FAILURE)
            }
        },
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = RuntimeConfig::load(cli.config.as_deref()).context("loading configuration")?;

    if let Command::Models = cli.command {
        return print_models(&config);
    }

    let registry = ProviderRegistry::with_defaults();
    let invoker = Arc::new(
        ResilientInvoker::from_config(&config, &registry).context("building provider")?,
    );

    match cli.command {
        Command::Text {
            prompt,
            models,
            temperature,
            schema,
            json,
        } => {
            let mut builder = base_builder(&config, Capability::Text, models).prompt(prompt);
            if let Some(t) = temperature {
                builder = builder.temperature(t);
            }
            if let Some(path) = schema {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("reading schema {}", path.display()))?;
                builder = builder.response_schema(
                    serde_json::from_str(&contents).context("schema is not valid JSON")?,
                );
            }
            let content = generate(&invoker, builder.build()?).await?;
            print_text(&content, json)
        }
        Command::Image {
            prompt,
            references,
            aspect_ratio,
            models,
            out,
        } => {
            let mut builder = base_builder(&config, Capability::Image, models).prompt(prompt);
            for path in &references {
                builder = builder.reference_image(read_image(path)?);
            }
            if let Some(ratio) = aspect_ratio {
                builder = builder.aspect_ratio(ratio);
            }
            let content = generate(&invoker, builder.build()?).await?;
            write_content(&content, &out)
        }
        Command::Speak {
            text,
            voice,
            models,
            out,
        } => {
            let mut builder = base_builder(&config, Capability::Audio, models).prompt(text);
            if let Some(voice) = voice {
                builder = builder.voice(voice);
            }
            let content = generate(&invoker, builder.build()?).await?;
            write_content(&content, &out)
        }
        Command::Recipe {
            file,
            name,
            vars,
            out,
        } => {
            let book = RecipeBook::from_file(&file)
                .with_context(|| format!("loading recipes from {}", file.display()))?;
            let recipe = book.get(&name)?;
            let values: BTreeMap<String, String> = vars.into_iter().collect();
            let mut spec = recipe.render(&values)?;
            if recipe.retry.is_none() {
                spec.retry = config.retry_policy();
            }

            let content = generate(&invoker, spec).await?;
            match (&content, out) {
                (GeneratedContent::Text(_), None) => print_text(&content, false),
                (_, Some(out)) => write_content(&content, &out),
                (_, None) => bail!("recipe '{}' produces binary output; pass --out", name),
            }
        }
        Command::Models => print_models(&config),
    }
}

/// Builder seeded with the configured retry policy and, unless overridden,
/// the configured model chain.
fn base_builder(config: &RuntimeConfig, capability: Capability, models: ModelArgs) -> RequestSpecBuilder {
    let chain = if models.models.is_empty() {
        config.models.for_capability(capability).to_vec()
    } else {
        models.models
    };
    RequestSpec::builder(capability)
        .models(chain)
        .retry(config.retry_policy())
}

/// Invoke with Ctrl-C wired to cancellation.
async fn generate(invoker: &Arc<ResilientInvoker>, spec: RequestSpec) -> Result<GeneratedContent> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = invoker.invoke_with_cancel(&spec, &cancel).await;
    watcher.abort();

    let generation = outcome?;
    tracing::info!(
        model = %generation.model,
        attempts = generation.attempts.len(),
        "Generated content"
    );
    Ok(generation.content)
}

fn print_text(content: &GeneratedContent, json: bool) -> Result<()> {
    let text = content
        .as_text()
        .ok_or_else(|| anyhow!("expected text output"))?;
    if json {
        let value: serde_json::Value =
            serde_json::from_str(text).context("answer is not valid JSON")?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn write_content(content: &GeneratedContent, out: &Path) -> Result<()> {
    let bytes = match content {
        GeneratedContent::Text(text) => text.clone().into_bytes(),
        GeneratedContent::Image(blob) => blob.data.clone(),
        GeneratedContent::Audio(blob) => PcmAudio::from_blob(blob)
            .and_then(|audio| audio.to_wav())
            .context("decoding speech audio")?,
    };
    fs::write(out, bytes).with_context(|| format!("writing {}", out.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn read_image(path: &Path) -> Result<InlineBlob> {
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => bail!("unsupported reference image type: {}", path.display()),
    };
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(InlineBlob::new(mime, data))
}

fn print_models(config: &RuntimeConfig) -> Result<()> {
    for capability in [Capability::Text, Capability::Image, Capability::Audio] {
        println!(
            "{:<6} {}",
            capability.to_string(),
            config.models.for_capability(capability).join(" -> ")
        );
    }
    Ok(())
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}
