mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use trailer_core::crop::{AspectRatio, CropPlan, CropReport};
use trailer_core::processor::{
    DirectJob, ManifestInspection, Processor, TrailerJob, TrailerReport,
};
use trailer_core::report::{AlwaysConfirm, Confirm, ProgressReporter};
use trailer_core::{load_trailer_config, TrailerConfig};

pub use progress::{StdinConfirm, TerminalReporter};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] trailer_core::ConfigError),
    #[error("{0}")]
    Processor(#[from] trailer_core::ProcessorError),
    #[error("montagem excedeu o tempo limite (transcode.merge_timeout_seconds): {0}")]
    MergeTimeout(#[source] trailer_core::ProcessorError),
    #[error("crop error: {0}")]
    Crop(#[from] trailer_core::crop::CropError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("saída {0} já existe; operação cancelada")]
    Declined(PathBuf),
    #[error("{0}")]
    Usage(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Baixa, monta e recorta trailers", long_about = None)]
pub struct Cli {
    /// Caminho do trailers.toml
    #[arg(long, global = true, default_value = "configs/trailers.toml")]
    pub config: PathBuf,
    /// Diretório override para arquivos temporários (substitui paths.temp_dir)
    #[arg(long, global = true)]
    pub temp_dir: Option<PathBuf>,
    /// Formato de saída
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log detalhado (equivale a RUST_LOG=debug)
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
    /// Sobrescreve saídas existentes sem perguntar
    #[arg(long, short, global = true, default_value_t = false)]
    pub yes: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Baixa um trailer a partir de um manifesto HLS e monta o MP4
    Fetch(FetchArgs),
    /// Monta um trailer a partir de URLs diretas de vídeo e áudio
    Direct(DirectArgs),
    /// Gera recortes em proporções fixas para os MP4 de um diretório
    Crop(CropArgs),
    /// Mostra as variantes do manifesto e a seleção, sem baixar mídia
    Inspect(InspectArgs),
    /// Calcula a geometria do recorte para uma altura de origem
    PlanCrop(PlanCropArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Título do trailer (nome do arquivo de saída)
    #[arg(long)]
    pub title: String,
    /// URL do manifesto master
    #[arg(long)]
    pub url: String,
    /// Caminho de saída (padrão: paths.output_dir/<título>.mp4)
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Proporções para recortar após a montagem (repetível, ex.: 9:16)
    #[arg(long = "ratio")]
    pub ratios: Vec<AspectRatio>,
}

#[derive(Args, Debug)]
pub struct DirectArgs {
    /// Título do trailer (nome do arquivo de saída)
    #[arg(long)]
    pub title: String,
    /// URL do arquivo de vídeo
    #[arg(long)]
    pub video_url: String,
    /// URL do arquivo de áudio
    #[arg(long)]
    pub audio_url: String,
    /// Caminho de saída (padrão: paths.output_dir/<título>.mp4)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CropArgs {
    /// Diretório com os MP4 (padrão: paths.output_dir)
    pub dir: Option<PathBuf>,
    /// Proporções (repetível; padrão: crop.aspect_ratios)
    #[arg(long = "ratio")]
    pub ratios: Vec<AspectRatio>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// URL do manifesto master
    pub url: String,
}

#[derive(Args, Debug)]
pub struct PlanCropArgs {
    /// Altura do vídeo de origem em pixels
    #[arg(long)]
    pub height: u32,
    /// Proporções (repetível; padrão: crop.aspect_ratios)
    #[arg(long = "ratio")]
    pub ratios: Vec<AspectRatio>,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);
    let confirm: Arc<dyn Confirm> = if cli.yes {
        Arc::new(AlwaysConfirm)
    } else {
        Arc::new(StdinConfirm)
    };
    let context = AppContext::new(&cli, Arc::new(TerminalReporter::new()), confirm)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Fetch(args) => {
            let outcome = runtime.block_on(context.fetch(args))?;
            render(&outcome, cli.format)?;
        }
        Commands::Direct(args) => {
            let report = runtime.block_on(context.direct(args))?;
            render(&report, cli.format)?;
        }
        Commands::Crop(args) => {
            let report = runtime.block_on(context.crop(args))?;
            render(&report, cli.format)?;
            if report.failure_count() > 0 {
                return Err(AppError::Usage(format!(
                    "{} recorte(s) falharam",
                    report.failure_count()
                )));
            }
        }
        Commands::Inspect(args) => {
            let inspection = runtime.block_on(context.inspect(args))?;
            render(&inspection, cli.format)?;
        }
        Commands::PlanCrop(args) => {
            let plans = context.plan_crop(args)?;
            render(&plans, cli.format)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn merge_error(err: trailer_core::ProcessorError) -> AppError {
    if err.is_timeout() {
        AppError::MergeTimeout(err)
    } else {
        AppError::Processor(err)
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

struct AppContext {
    config: TrailerConfig,
    processor: Processor,
    output_dir: PathBuf,
    confirm: Arc<dyn Confirm>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("processor", &self.processor)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    fn new(
        cli: &Cli,
        reporter: Arc<dyn ProgressReporter>,
        confirm: Arc<dyn Confirm>,
    ) -> Result<Self> {
        let config = load_trailer_config(&cli.config)?;
        let cwd = std::env::current_dir()?;
        let temp_dir = cli
            .temp_dir
            .clone()
            .unwrap_or_else(|| TrailerConfig::resolve_path(&cwd, &config.paths.temp_dir));
        let output_dir = TrailerConfig::resolve_path(&cwd, &config.paths.output_dir);
        debug!(config = %cli.config.display(), temp = %temp_dir.display(), "configuration loaded");
        let processor = Processor::new(&config, reporter)?.with_temp_dir(temp_dir);
        Ok(Self {
            config,
            processor,
            output_dir,
            confirm,
        })
    }

    fn output_for(&self, title: &str, explicit: Option<&PathBuf>) -> PathBuf {
        explicit
            .cloned()
            .unwrap_or_else(|| self.output_dir.join(format!("{title}.mp4")))
    }

    fn ensure_writable(&self, output: &Path) -> Result<()> {
        if output.exists()
            && !self
                .confirm
                .confirm(&format!("{} já existe. Sobrescrever?", output.display()))
        {
            return Err(AppError::Declined(output.to_path_buf()));
        }
        Ok(())
    }

    fn ratios_or_default(&self, ratios: &[AspectRatio]) -> Result<Vec<AspectRatio>> {
        if !ratios.is_empty() {
            return Ok(ratios.to_vec());
        }
        self.config
            .crop
            .aspect_ratios
            .iter()
            .map(|raw| AspectRatio::parse(raw).map_err(AppError::from))
            .collect()
    }

    async fn fetch(&self, args: &FetchArgs) -> Result<FetchOutcome> {
        let output = self.output_for(&args.title, args.output.as_ref());
        self.ensure_writable(&output)?;
        let trailer = self
            .processor
            .process_manifest(&TrailerJob {
                title: args.title.clone(),
                manifest_url: args.url.clone(),
                output: output.clone(),
            })
            .await
            .map_err(merge_error)?;
        let crop = if args.ratios.is_empty() {
            None
        } else {
            let dir = output
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Some(self.processor.crop_directory(&dir, &args.ratios).await?)
        };
        Ok(FetchOutcome { trailer, crop })
    }

    async fn direct(&self, args: &DirectArgs) -> Result<TrailerReport> {
        let output = self.output_for(&args.title, args.output.as_ref());
        self.ensure_writable(&output)?;
        let report = self
            .processor
            .process_direct(&DirectJob {
                title: args.title.clone(),
                video_url: args.video_url.clone(),
                audio_url: args.audio_url.clone(),
                output,
            })
            .await
            .map_err(merge_error)?;
        Ok(report)
    }

    async fn crop(&self, args: &CropArgs) -> Result<CropReport> {
        let dir = args.dir.clone().unwrap_or_else(|| self.output_dir.clone());
        let ratios = self.ratios_or_default(&args.ratios)?;
        info!(dir = %dir.display(), ratios = ratios.len(), "crop requested");
        Ok(self.processor.crop_directory(&dir, &ratios).await?)
    }

    async fn inspect(&self, args: &InspectArgs) -> Result<ManifestInspection> {
        Ok(self.processor.inspect(&args.url).await?)
    }

    fn plan_crop(&self, args: &PlanCropArgs) -> Result<Vec<CropPlanRow>> {
        if args.height == 0 {
            return Err(AppError::Usage("altura deve ser maior que zero".into()));
        }
        let ratios = self.ratios_or_default(&args.ratios)?;
        Ok(ratios
            .into_iter()
            .map(|ratio| CropPlanRow::from(CropPlan::new(args.height, ratio)))
            .collect())
    }
}

#[derive(Debug, Serialize)]
pub struct FetchOutcome {
    pub trailer: TrailerReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropReport>,
}

#[derive(Debug, Serialize)]
pub struct CropPlanRow {
    pub ratio: String,
    pub width: u32,
    pub height: u32,
    pub filter: String,
}

impl From<CropPlan> for CropPlanRow {
    fn from(plan: CropPlan) -> Self {
        Self {
            ratio: plan.ratio.to_string(),
            width: plan.target_width(),
            height: plan.target_height(),
            filter: plan.filter(),
        }
    }
}

impl DisplayFallback for TrailerReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} -> {}", self.title, self.output.display())];
        if let Some(video) = &self.video {
            lines.push(format!(
                "  vídeo: {} ({}, {} bps, {} segmentos)",
                video.uri, video.resolution, video.bandwidth, self.video_segments
            ));
        }
        match &self.audio {
            Some(audio) => lines.push(format!(
                "  áudio: {} ({}, {} segmentos)",
                audio.uri,
                audio.language.as_deref().unwrap_or("-"),
                self.audio_segments
            )),
            None if self.video.is_some() => lines.push("  áudio: nenhum".to_string()),
            None => {}
        }
        lines.push(format!(
            "  quadros: {} | montagem: {:.1}s | concluído em {}",
            self.total_frames,
            self.merge_elapsed.as_secs_f64(),
            self.completed_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
        ));
        lines.join("\n")
    }
}

impl DisplayFallback for CropReport {
    fn display(&self) -> String {
        if self.videos.is_empty() {
            return "Nenhum vídeo encontrado".to_string();
        }
        let mut lines = Vec::new();
        for video in &self.videos {
            let height = video
                .source_height
                .map(|h| format!("{h}p"))
                .unwrap_or_else(|| "?".to_string());
            lines.push(format!("{} [{}]", video.source.display(), height));
            for output in &video.outputs {
                lines.push(format!("  ok   {}", output.display()));
            }
            for failure in &video.failures {
                lines.push(format!(
                    "  erro {}: {}",
                    failure.ratio.as_deref().unwrap_or("*"),
                    failure.error
                ));
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for FetchOutcome {
    fn display(&self) -> String {
        match &self.crop {
            Some(crop) => format!("{}\n{}", self.trailer.display(), crop.display()),
            None => self.trailer.display(),
        }
    }
}

impl DisplayFallback for ManifestInspection {
    fn display(&self) -> String {
        let mut lines = vec![format!("Manifesto: {}", self.manifest_url)];
        for variant in &self.variants {
            let marker = if variant.uri == self.selected_video.uri {
                "*"
            } else {
                " "
            };
            lines.push(format!(
                " {marker} {} | {} bps | {:?} | {}",
                variant.resolution, variant.bandwidth, variant.dynamic_range, variant.uri
            ));
        }
        if !self.audio_groups.is_empty() {
            lines.push(format!("Grupos de áudio: {}", self.audio_groups.join(", ")));
        }
        match &self.selected_audio {
            Some(audio) => lines.push(format!(
                "Áudio selecionado: {} ({})",
                audio.uri,
                audio.language.as_deref().unwrap_or("-")
            )),
            None => lines.push("Áudio selecionado: nenhum".to_string()),
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<CropPlanRow> {
    fn display(&self) -> String {
        self.iter()
            .map(|row| format!("{:>5} -> {}x{} ({})", row.ratio, row.width, row.height, row.filter))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use trailer_core::report::{NeverConfirm, SilentReporter};

    fn prepare_test_context(confirm: Arc<dyn Confirm>) -> Result<(TempDir, AppContext)> {
        let temp = TempDir::new().unwrap();
        let configs_dir = temp.path().join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::copy("../configs/trailers.toml", configs_dir.join("trailers.toml")).unwrap();

        let cli = Cli::try_parse_from([
            "trailerctl",
            "--config",
            configs_dir.join("trailers.toml").to_str().unwrap(),
            "--temp-dir",
            temp.path().join("tmp").to_str().unwrap(),
            "plan-crop",
            "--height",
            "1080",
        ])
        .unwrap();
        let context = AppContext::new(&cli, Arc::new(SilentReporter), confirm)?;
        Ok((temp, context))
    }

    #[test]
    fn parses_repeated_ratios() {
        let cli = Cli::try_parse_from([
            "trailerctl",
            "--format",
            "json",
            "fetch",
            "--title",
            "Dune",
            "--url",
            "https://example.com/master.m3u8",
            "--ratio",
            "9:16",
            "--ratio",
            "1:1",
        ])
        .unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.title, "Dune");
                assert_eq!(args.ratios.len(), 2);
                assert_eq!(args.ratios[0].to_string(), "9:16");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_ratio() {
        let parsed = Cli::try_parse_from(["trailerctl", "crop", "--ratio", "wide"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn plan_crop_uses_configured_ratios() {
        let (_temp, context) = prepare_test_context(Arc::new(AlwaysConfirm)).unwrap();
        let rows = context
            .plan_crop(&PlanCropArgs {
                height: 1080,
                ratios: Vec::new(),
            })
            .unwrap();
        let widths: Vec<(String, u32)> = rows
            .iter()
            .map(|row| (row.ratio.clone(), row.width))
            .collect();
        assert_eq!(
            widths,
            vec![
                ("16:9".to_string(), 1920),
                ("9:16".to_string(), 608),
                ("1:1".to_string(), 1080),
                ("4:5".to_string(), 864),
            ]
        );
        assert_eq!(rows[1].filter, "crop=608:1080");
    }

    #[test]
    fn plan_crop_rejects_zero_height() {
        let (_temp, context) = prepare_test_context(Arc::new(AlwaysConfirm)).unwrap();
        let result = context.plan_crop(&PlanCropArgs {
            height: 0,
            ratios: Vec::new(),
        });
        assert!(matches!(result, Err(AppError::Usage(_))));
    }

    #[tokio::test]
    async fn declined_overwrite_stops_before_download() {
        let (temp, context) = prepare_test_context(Arc::new(NeverConfirm)).unwrap();
        let output = temp.path().join("Dune.mp4");
        fs::write(&output, b"existing").unwrap();

        let result = context
            .fetch(&FetchArgs {
                title: "Dune".into(),
                url: "https://invalid.example/master.m3u8".into(),
                output: Some(output.clone()),
                ratios: Vec::new(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Declined(path)) if path == output));
        assert_eq!(fs::read(&output).unwrap(), b"existing");
        assert!(!temp.path().join("tmp").exists());
    }

    #[test]
    fn plan_rows_serialize_for_json_output() {
        let row = CropPlanRow::from(CropPlan::new(1080, AspectRatio::parse("21:9").unwrap()));
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["width"], 2520);
        assert_eq!(value["ratio"], "21:9");
    }

    #[test]
    fn merge_deadline_gets_its_own_message() {
        use std::time::Duration;
        use trailer_core::ffmpeg::TranscodeError;
        use trailer_core::ProcessorError;

        let timed_out = merge_error(ProcessorError::from(TranscodeError::TimedOut {
            output: PathBuf::from("Dune.mp4"),
            limit: Duration::from_secs(300),
        }));
        assert!(matches!(timed_out, AppError::MergeTimeout(_)));
        assert!(timed_out.to_string().starts_with("montagem excedeu o tempo limite"));

        let other = merge_error(ProcessorError::Network("refused".into()));
        assert!(matches!(other, AppError::Processor(_)));
    }

    #[test]
    fn default_output_uses_title() {
        let (_temp, context) = prepare_test_context(Arc::new(AlwaysConfirm)).unwrap();
        let output = context.output_for("Heat", None);
        assert!(output.ends_with("trailers/Heat.mp4"));
    }
}
