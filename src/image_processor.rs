//! # Image Processing Module
//!
//! Questo modulo comprime le immagini delegando tutto il lavoro a tool
//! esterni specializzati, uno (o due) per formato.
//!
//! ## Formati Supportati
//!
//! | Formato | Tool                     | Argomenti |
//! |---------|--------------------------|-----------|
//! | PNG     | pngquant, poi oxipng     | `--quality=<lo>-<hi> --force --output <out> <in>`, poi `-o 2 -q <out>` |
//! | JPEG    | djpeg \| cjpeg (mozjpeg) | `<in>` → stdout; `-quality <q> -optimize -progressive -outfile <out>` da stdin |
//! | WebP    | cwebp                    | `-q <q> -m 6 <in> -o <out>` |
//! | GIF     | gifsicle                 | `-O<level> --colors 256 <in> -o <out>` |
//! | Altri   | nessuno                  | `UnsupportedFormat`, nessun processo avviato |
//!
//! ## Pipeline di Compressione
//!
//! 1. **Formato**: dall'estensione; formati non supportati falliscono subito
//! 2. **Tool**: tutti i tool obbligatori vengono risolti prima di avviare
//!    qualsiasi processo (`ToolNotFound` altrimenti)
//! 3. **Contenuto**: magic bytes verificati (`InvalidImage`)
//! 4. **Piano di output**: diretto, oppure file temporaneo per l'in-place
//! 5. **Esecuzione**: tool del formato scelto
//! 6. **Finalizzazione**: swap in-place, poi dimensione letta dal filesystem
//!
//! ## Exit code
//!
//! 0 è successo per tutti i tool. pngquant esce con 99 quando non riesce a
//! raggiungere la qualità minima richiesta ma produce comunque un risultato:
//! è l'unico exit code non-zero accettato. oxipng è best-effort, un suo
//! fallimento non fa fallire il job.

use crate::config::Config;
use crate::error::CompressionError;
use crate::file_manager::FileManager;
use crate::job::{ImageFormat, JobSpec};
use crate::optimizer::replace_manager::{OutputPlan, ReplaceManager};
use crate::pipeline::{self, Stage};
use crate::quality::Quality;
use crate::tool_registry::{ToolRegistry, CJPEG, CWEBP, DJPEG, GIFSICLE, OXIPNG, PNGQUANT};
use crate::utils::path_arg;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// pngquant: "could not reach the requested quality, wrote best effort"
pub const PNGQUANT_QUALITY_TOO_LOW: i32 = 99;

/// WebP compression effort; 6 is the slowest and smallest
const WEBP_METHOD: u8 = 6;

/// GIF palette cap
const GIF_MAX_COLORS: u16 = 256;

/// oxipng optimization level for the lossless pass
const OXIPNG_LEVEL: u8 = 2;

/// Anything able to compress one job. Implemented by [`ImageProcessor`];
/// the scheduler only sees this trait.
pub trait Compressor: Send + Sync + 'static {
    /// Compress `job` and return the final compressed size in bytes
    fn compress(&self, job: JobSpec, quality: Quality) -> BoxFuture<'static, Result<u64, CompressionError>>;
}

/// Codec invoker backed by external tools
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    tools: Arc<ToolRegistry>,
    replace: ReplaceManager,
}

impl ImageProcessor {
    pub fn new(tools: Arc<ToolRegistry>, replace: ReplaceManager) -> Self {
        Self { tools, replace }
    }

    /// Discover tools and scratch location from configuration
    pub fn from_config(config: &Config) -> Self {
        let tools = ToolRegistry::discover(config.tools_dir.clone());
        let replace = ReplaceManager::new(config.effective_scratch_dir());
        Self::new(Arc::new(tools), replace)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Tools a format cannot be compressed without
    pub fn required_tools(format: ImageFormat) -> &'static [&'static str] {
        match format {
            ImageFormat::Png => &[PNGQUANT],
            ImageFormat::Jpeg => &[DJPEG, CJPEG],
            ImageFormat::Webp => &[CWEBP],
            ImageFormat::Gif => &[GIFSICLE],
            ImageFormat::Unsupported => &[],
        }
    }

    fn require(&self, name: &str) -> Result<PathBuf, CompressionError> {
        self.tools
            .resolve(name)
            .ok_or_else(|| CompressionError::ToolNotFound(name.to_string()))
    }

    /// Compress one job and return the size of the finalized output
    pub async fn compress_job(&self, job: &JobSpec, quality: Quality) -> Result<u64, CompressionError> {
        if !job.format.is_supported() {
            let ext = job
                .source
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(CompressionError::UnsupportedFormat(ext));
        }

        let tools = Self::required_tools(job.format)
            .iter()
            .map(|name| self.require(name))
            .collect::<Result<Vec<_>, _>>()?;

        FileManager::verify_content(&job.source, job.format)?;

        let plan = self.replace.prepare(job).await?;
        debug!(
            "Compressing {} {} -> {} (quality: {})",
            job.format.display_name(),
            job.source.display(),
            plan.write_path().display(),
            quality
        );

        let start_time = std::time::Instant::now();
        self.run_codec(job, &tools, &plan, quality).await?;

        let final_path = plan.finalize().await?;
        let size = tokio::fs::metadata(&final_path).await?.len();
        debug!(
            "{} compressed {} -> {} bytes in {:?}",
            job.id,
            job.original_size,
            size,
            start_time.elapsed()
        );
        Ok(size)
    }

    async fn run_codec(
        &self,
        job: &JobSpec,
        tools: &[PathBuf],
        plan: &OutputPlan,
        quality: Quality,
    ) -> Result<(), CompressionError> {
        let input = job.source.as_path();
        let output = plan.write_path();

        match (job.format, tools) {
            (ImageFormat::Png, [pngquant]) => self.compress_png(pngquant, input, output, quality).await,
            (ImageFormat::Jpeg, [djpeg, cjpeg]) => compress_jpeg(djpeg, cjpeg, input, output, quality).await,
            (ImageFormat::Webp, [cwebp]) => {
                pipeline::run_tool(cwebp, &webp_args(quality, input, output), &[]).await
            }
            (ImageFormat::Gif, [gifsicle]) => {
                pipeline::run_tool(gifsicle, &gif_args(quality, input, output), &[]).await
            }
            _ => Err(CompressionError::UnsupportedFormat(job.format.display_name().to_string())),
        }
    }

    /// pngquant lossy pass, then best-effort oxipng on the result
    async fn compress_png(
        &self,
        pngquant: &Path,
        input: &Path,
        output: &Path,
        quality: Quality,
    ) -> Result<(), CompressionError> {
        pipeline::run_tool(
            pngquant,
            &pngquant_args(quality, input, output),
            &[PNGQUANT_QUALITY_TOO_LOW],
        )
        .await?;

        if let Some(oxipng) = self.tools.resolve(OXIPNG) {
            if let Err(e) = pipeline::run_tool(&oxipng, &oxipng_args(output), &[]).await {
                warn!("Lossless PNG pass skipped for {}: {}", output.display(), e);
            }
        }

        Ok(())
    }
}

/// djpeg decodes to stdout, cjpeg re-encodes from stdin
async fn compress_jpeg(
    djpeg: &Path,
    cjpeg: &Path,
    input: &Path,
    output: &Path,
    quality: Quality,
) -> Result<(), CompressionError> {
    let decode_args = djpeg_args(input);
    let encode_args = cjpeg_args(quality, output);
    pipeline::pipe(
        Stage::new("decode stage (djpeg)", djpeg, &decode_args),
        Stage::new("encode stage (cjpeg)", cjpeg, &encode_args),
    )
    .await
}

impl Compressor for ImageProcessor {
    fn compress(&self, job: JobSpec, quality: Quality) -> BoxFuture<'static, Result<u64, CompressionError>> {
        let processor = self.clone();
        async move { processor.compress_job(&job, quality).await }.boxed()
    }
}

pub fn pngquant_args(quality: Quality, input: &Path, output: &Path) -> Vec<String> {
    crate::args![
        format!("--quality={}", quality.png_quality_range()),
        "--force",
        "--output",
        path_arg(output),
        path_arg(input),
    ]
}

pub fn oxipng_args(file: &Path) -> Vec<String> {
    crate::args!["-o", OXIPNG_LEVEL, "-q", path_arg(file)]
}

pub fn djpeg_args(input: &Path) -> Vec<String> {
    crate::args![path_arg(input)]
}

pub fn cjpeg_args(quality: Quality, output: &Path) -> Vec<String> {
    crate::args![
        "-quality",
        quality.jpeg_quality(),
        "-optimize",
        "-progressive",
        "-outfile",
        path_arg(output),
    ]
}

pub fn webp_args(quality: Quality, input: &Path, output: &Path) -> Vec<String> {
    crate::args!["-q", quality.webp_quality(), "-m", WEBP_METHOD, path_arg(input), "-o", path_arg(output)]
}

pub fn gif_args(quality: Quality, input: &Path, output: &Path) -> Vec<String> {
    crate::args![
        format!("-O{}", quality.gif_optimize_level()),
        "--colors",
        GIF_MAX_COLORS,
        path_arg(input),
        "-o",
        path_arg(output),
    ]
}
