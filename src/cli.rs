use crate::config::Theme;
use crate::formats::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "squeeze-box",
    about = "Batch image compression and ZIP archiving, entirely local",
    long_about = "squeeze-box resizes and recompresses batches of images (JPEG, PNG, WebP) \
                  and bundles arbitrary files into ZIP archives, optionally AES-encrypted. \
                  Nothing leaves the machine.",
    version,
    after_help = "EXAMPLES:\n  \
    squeeze-box compress ./photos -o ./out -Q 75 -w 1600 -f webp\n  \
    squeeze-box compress \"./shots/*.png\" -o ./out --zip\n  \
    squeeze-box archive ./report ./notes.txt -o ./dist -l 9 -p secret --preserve-paths -r\n  \
    squeeze-box theme light"
)]
pub struct Args {
    #[arg(long, global = true, help = "Settings file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Print debug details")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Resize and recompress images",
        long_about = "Resize images to a maximum width (height follows the aspect ratio) and \
                      re-encode them at the given quality. Each output is written next to the \
                      others in the output directory, or bundled into one ZIP with --zip."
    )]
    Compress {
        #[arg(
            required = true,
            help = "Image files, directories or glob patterns"
        )]
        inputs: Vec<String>,

        #[arg(short = 'o', long, help = "Output directory")]
        output: PathBuf,

        #[arg(
            short = 'Q',
            long,
            help = "Quality (1-100, default: 80)",
            long_help = "Quality from 1 (smallest) to 100 (best). For PNG output: >=90 uses Zopfli, \
                         >=70 uses high libdeflate effort, lower uses standard effort."
        )]
        quality: Option<u8>,

        #[arg(
            short = 'w',
            long = "max-width",
            help = "Maximum width in pixels (default: 1920)",
            long_help = "Images wider than this are scaled down so their width equals it; \
                         narrower images keep their size."
        )]
        max_width: Option<u32>,

        #[arg(
            short = 'f',
            long,
            help = "Output format (keep, jpeg, png, webp)"
        )]
        format: Option<OutputFormat>,

        #[arg(long, help = "Flatten transparent pixels onto white")]
        flatten: bool,

        #[arg(long = "keep-metadata", help = "Keep PNG metadata chunks")]
        keep_metadata: bool,

        #[arg(
            short = 'j',
            long,
            help = "Parallel workers (0 = auto, default: 1)",
            long_help = "Number of images transformed at once. Results keep input order \
                         regardless of the worker count."
        )]
        jobs: Option<usize>,

        #[arg(short = 'r', long, help = "Descend into subdirectories")]
        recursive: bool,

        #[arg(long, help = "Bundle all outputs into a single ZIP")]
        zip: bool,

        #[arg(long = "zip-name", help = "Name of the bundle written by --zip")]
        zip_name: Option<String>,
    },

    #[command(
        about = "Bundle files into a ZIP archive",
        long_about = "Bundle any files into one ZIP. Level 0 stores entries uncompressed, \
                      9 spends the most effort. With a password, entries are AES-256 encrypted."
    )]
    Archive {
        #[arg(required = true, help = "Files, directories or glob patterns")]
        inputs: Vec<String>,

        #[arg(short = 'o', long, help = "Output directory")]
        output: PathBuf,

        #[arg(short = 'l', long, help = "Compression level 0-9 (default: 6)")]
        level: Option<u8>,

        #[arg(short = 'p', long, help = "Encrypt entries with this password")]
        password: Option<String>,

        #[arg(
            long = "preserve-paths",
            help = "Keep folder structure below each input directory"
        )]
        preserve_paths: bool,

        #[arg(short = 'n', long, help = "Archive file name (default: archive.zip)")]
        name: Option<String>,

        #[arg(short = 'r', long, help = "Descend into subdirectories")]
        recursive: bool,
    },

    #[command(about = "Show or set the colour theme")]
    Theme {
        #[arg(help = "light or dark; omit to show the current theme")]
        theme: Option<Theme>,
    },
}
