use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, ValueEnum};
use rayon::prelude::*;
use sheetfill_core::{
    DataValue, GenerateOptions, OutputEncoding, SheetId, SubstitutionReport, TemplateConfig, Workbook,
};
use std::fs;
use std::path::{Path, PathBuf};

mod formatter;
mod logger;

#[derive(Parser)]
#[command(name = "sheetfill")]
#[command(about = "Fill Excel (xlsx) templates with JSON data", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the xlsx template
    #[arg(value_name = "TEMPLATE")]
    template: PathBuf,

    /// JSON data file; repeat to render one workbook per file
    #[arg(short, long = "data", value_name = "JSON", required = true, num_args = 1..)]
    data: Vec<PathBuf>,

    /// Output file (single data file only)
    #[arg(short, long, value_name = "FILE", conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Output directory; each workbook is named after its data file
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Sheet to substitute, by name or 1-based position (default: all sheets)
    #[arg(short, long = "sheet", value_name = "NAME|N")]
    sheets: Vec<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output format of the summary
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Encoding of the written workbook
    #[arg(long, value_enum, default_value = "bytes")]
    encoding: Encoding,

    /// Substitute and report without writing anything
    #[arg(long)]
    dry_run: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Encoding {
    /// Raw xlsx bytes
    Bytes,
    /// Base64 text of the xlsx bytes
    Base64,
}

impl From<Encoding> for OutputEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Bytes => OutputEncoding::Bytes,
            Encoding::Base64 => OutputEncoding::Base64,
        }
    }
}

/// What happened to one data file
pub struct FillOutcome {
    pub data: PathBuf,
    /// `None` on dry runs
    pub output: Option<PathBuf>,
    pub result: Result<Vec<SubstitutionReport>>,
}

impl FillOutcome {
    pub fn failed(&self) -> bool {
        self.result.is_err()
    }
}

struct RunOptions {
    sheets: Vec<SheetId>,
    generate: GenerateOptions,
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(logger::level_for(cli.verbose, cli.quiet));

    let config = load_config(cli.config.as_deref())?;
    let template = fs::read(&cli.template)
        .with_context(|| format!("Failed to read template {}", cli.template.display()))?;
    let jobs = plan_outputs(&cli.template, &cli.data, cli.output.as_deref(), cli.output_dir.as_deref())?;

    if let Some(dir) = &cli.output_dir {
        if !cli.dry_run {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        }
    }

    let options = RunOptions {
        sheets: cli.sheets.iter().map(|s| parse_sheet_id(s)).collect(),
        generate: GenerateOptions {
            encoding: cli.encoding.into(),
            ..GenerateOptions::default()
        },
        dry_run: cli.dry_run,
    };

    let outcomes: Vec<FillOutcome> = jobs
        .par_iter()
        .map(|(data, output)| FillOutcome {
            data: data.clone(),
            output: (!options.dry_run).then(|| output.clone()),
            result: fill_one(&template, &config, data, output, &options),
        })
        .collect();

    match cli.format {
        OutputFormat::Human => formatter::print_human(&cli.template, &outcomes),
        OutputFormat::Json => formatter::print_json(&cli.template, &outcomes)?,
    }

    let exit_code = if outcomes.iter().any(FillOutcome::failed) { 1 } else { 0 };
    std::process::exit(exit_code);
}

fn load_config(path: Option<&Path>) -> Result<TemplateConfig> {
    if let Some(path) = path {
        return TemplateConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    // Try to load default config from current directory if it exists
    let default_path = PathBuf::from("sheetfill.toml");
    if default_path.exists() {
        TemplateConfig::from_file(&default_path)
            .with_context(|| format!("Failed to load config from {}", default_path.display()))
    } else {
        Ok(TemplateConfig::default())
    }
}

/// Pair every data file with the path its workbook is written to
fn plan_outputs(
    template: &Path,
    data: &[PathBuf],
    output: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    if data.len() > 1 && output.is_some() {
        bail!("--output takes a single data file; use --output-dir for several");
    }
    let stem = |path: &Path| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    };

    if let [single] = data {
        if output_dir.is_none() {
            let target = match output {
                Some(output) => output.to_path_buf(),
                None => template.with_file_name(format!("{}.filled.xlsx", stem(template))),
            };
            return Ok(vec![(single.clone(), target)]);
        }
    }

    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => template.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(data
        .iter()
        .map(|d| (d.clone(), dir.join(format!("{}.xlsx", stem(d)))))
        .collect())
}

fn parse_sheet_id(raw: &str) -> SheetId {
    match raw.parse::<usize>() {
        Ok(n) => SheetId::Index(n),
        Err(_) => SheetId::Name(raw.to_string()),
    }
}

fn fill_one(
    template: &[u8],
    config: &TemplateConfig,
    data_path: &Path,
    output: &Path,
    options: &RunOptions,
) -> Result<Vec<SubstitutionReport>> {
    let raw = fs::read_to_string(data_path)
        .with_context(|| format!("Failed to read data file {}", data_path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in {}", data_path.display()))?;
    let data = DataValue::from(json);

    let mut workbook = Workbook::from_bytes(template)?.with_config(config.clone());
    let reports = if options.sheets.is_empty() {
        workbook.substitute_all(&data)?
    } else {
        options
            .sheets
            .iter()
            .map(|id| workbook.substitute(id.clone(), &data))
            .collect::<Result<Vec<_>, _>>()?
    };

    if !options.dry_run {
        let generated = workbook.generate(&options.generate)?;
        fs::write(output, generated.as_bytes())
            .with_context(|| format!("Failed to write {}", output.display()))?;
        log::info!("{} -> {}", data_path.display(), output.display());
    }
    Ok(reports)
}
