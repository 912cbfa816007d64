use clap::{Args as ClapArgs, Parser, Subcommand};

pub mod record;
pub mod serve;

pub use record::handle_record_command;
pub use serve::handle_serve_command;

#[derive(Parser, Debug)]
#[command(name = "voxnote")]
#[command(about = "Voice note capture and transcription", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the capture-session server
    Serve(ServeCliArgs),
    /// Record a voice note and print the transcript
    Record(RecordCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct ServeCliArgs {
    /// Override the configured listen port
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RecordCliArgs {
    /// Server to upload to (default: from config)
    #[arg(long)]
    pub server_url: Option<String>,
    /// Spoken language code, e.g. "en" (default: auto-detect)
    #[arg(short, long)]
    pub language: Option<String>,
    /// Translate the transcript after transcribing
    #[arg(short, long)]
    pub translate: bool,
    /// Translation target language code (default: from config)
    #[arg(long)]
    pub target_lang: Option<String>,
    /// Do not copy the transcript to the clipboard
    #[arg(long)]
    pub no_copy: bool,
}
