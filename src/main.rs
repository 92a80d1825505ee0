use clap::{Parser, Subcommand};
use dataset_annotator::filter::{self, FilterMode, FilterOptions, Transfer};
use dataset_annotator::rules::EditPermission;
use dataset_annotator::service::{AnnotationWrite, Annotator, SaveRequest};
use dataset_annotator::{config, output, template};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "dataset-annotator")]
#[command(about = "Index media files with sidecar annotations for browsing and editing")]
#[command(long_about = "\
Index media files with sidecar annotations for browsing and editing

Every file is read as BASE.TAG. Files sharing a BASE form one item: the
medium (image > video > audio > text) plus its annotations, whose TAG
carries an underscore. The part after the last underscore is the
annotation's format.

Dataset structure:

  dataset/
  ├── annotator.toml                  # Optional config (see gen-config)
  ├── template.yaml                   # Optional template (see gen-template)
  ├── image1.jpg                      # Medium
  ├── image1.meta_json                # Annotations
  ├── image1.WD14_txt
  ├── image1.caption1_txt
  ├── image1.system_label_meta_txt    # Per-item quick label
  └── dir1/
      ├── system_label_dir_meta_txt   # Per-directory quick label
      ├── clip.mp4
      └── clip.caption_txt

Items are numbered from 0 in base-name order. Annotations are ordered by
the template's ordering patterns (default: meta_json, WD14_txt,
caption<N>_txt), then by filename.

Run 'dataset-annotator gen-config' to generate a documented annotator.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Dataset root directory
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Template file (overrides `template` in annotator.toml)
    #[arg(long, global = true)]
    template: Option<PathBuf>,

    /// Log debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the dataset and list its items
    Scan,
    /// Show one item as a client sees it
    Show {
        /// Item index
        idx: usize,
        /// Print the item payload as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write annotations and/or the quick label of one item
    Save {
        /// Item index
        idx: usize,
        /// Annotation to write, path relative to the dataset root (repeatable)
        #[arg(long = "set", value_name = "FILENAME=CONTENT", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
        /// Quick label text
        #[arg(long)]
        quick_label: Option<String>,
        /// Write annotations the template marks readonly or hides
        #[arg(long)]
        force: bool,
    },
    /// Print a dataset file to stdout
    Cat {
        /// Path relative to the dataset root
        path: String,
    },
    /// Copy or move items whose label passes an expression
    Filter {
        /// Destination directory
        output: PathBuf,
        /// Expression over the label text `x`, e.g. "x.strip() == 'good'"
        #[arg(long)]
        expr: String,
        /// Comma separated medium extensions, or "all"
        #[arg(long, default_value = "all")]
        ext: String,
        /// Judge items by their own label ("item") or their directory's ("dir")
        #[arg(long, default_value = "item")]
        filter_mode: FilterMode,
        /// "copy" or "move"
        #[arg(long, default_value = "copy")]
        mode: Transfer,
    },
    /// Print a stock annotator.toml with all options documented
    GenConfig,
    /// Print a stock annotation template with all options documented
    GenTemplate,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan => {
            let annotator = open(&cli.root, cli.template.as_deref())?;
            annotator.with_index(|index| {
                output::print_scan_output(
                    index,
                    annotator.root(),
                    annotator.rules(),
                    annotator.ordering(),
                )
            });
        }
        Command::Show { idx, json } => {
            let annotator = open(&cli.root, cli.template.as_deref())?;
            let view = annotator.item(idx)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                output::print_item_view(&view);
                println!("Cache: {}", annotator.cache_stats());
            }
        }
        Command::Save {
            idx,
            set,
            quick_label,
            force,
        } => {
            let annotator = open(&cli.root, cli.template.as_deref())?;
            if !force {
                for (filename, _) in &set {
                    let permission = annotator.edit_permission(filename);
                    if permission != EditPermission::Editable {
                        return Err(format!(
                            "{filename} is not editable under the template ({permission:?}); use --force to write it anyway"
                        )
                        .into());
                    }
                }
            }
            let request = SaveRequest {
                annotations: set
                    .into_iter()
                    .map(|(filename, content)| AnnotationWrite { filename, content })
                    .collect(),
                quick_label,
            };
            let outcome = annotator.save(idx, &request)?;
            output::print_save_output(idx, &outcome, annotator.root());
        }
        Command::Cat { path } => {
            let annotator = open(&cli.root, cli.template.as_deref())?;
            let body = annotator.read_file(&path)?;
            tracing::debug!(
                "serving {path} as {} ({})",
                body.content_type,
                if body.is_cached() { "cached" } else { "disk" }
            );
            let bytes = body.read()?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
        Command::Filter {
            output: dest,
            expr,
            ext,
            filter_mode,
            mode,
        } => {
            let options = FilterOptions {
                input: cli.root.clone(),
                output: dest.clone(),
                extensions: filter::parse_extensions(&ext),
                mode: filter_mode,
                expr,
                transfer: mode,
            };
            let report = filter::filter_dataset(&options)?;
            output::print_filter_output(&report, &dest);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::GenTemplate => {
            print!("{}", template::stock_template_yaml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "dataset_annotator=debug"
    } else {
        "dataset_annotator=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load `annotator.toml`, apply the CLI template override, and index the root.
fn open(root: &Path, template: Option<&Path>) -> Result<Annotator, Box<dyn std::error::Error>> {
    let mut config = config::load_config(root)?;
    if let Some(template) = template {
        // Relative to the working directory, not the dataset root
        let template = std::path::absolute(template)?;
        config.template = Some(template.to_string_lossy().into_owned());
    }
    Ok(Annotator::open(root, config)?)
}

/// Parse `FILENAME=CONTENT`. Only the first `=` separates.
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, content)) if !name.is_empty() => Ok((name.to_string(), content.to_string())),
        _ => Err(format!("expected FILENAME=CONTENT, got {s:?}")),
    }
}
