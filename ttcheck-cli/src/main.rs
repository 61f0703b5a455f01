use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ttcheck_cli::commands;

#[derive(Parser)]
#[command(name = "ttcheck")]
#[command(about = "ttcheck - Capture dissector and CoAP conformance analyzer", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 6LoWPAN context as <id>=<prefix>/<len> (repeatable)
    #[arg(long = "context", global = true, value_name = "ID=PREFIX/LEN")]
    contexts: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One line per frame
    Summary {
        /// Input capture file
        #[arg(short, long)]
        input: String,

        /// Only frames carrying this protocol
        #[arg(short, long)]
        protocol: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Output JSON file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Full field-by-field dissection
    Dissect {
        /// Input capture file
        #[arg(short, long)]
        input: String,

        /// Only frames carrying this protocol
        #[arg(short, long)]
        protocol: Option<String>,

        /// Output file
        #[arg(short, long)]
        output: Option<String>,

        /// Indented text instead of JSON
        #[arg(long)]
        text: bool,
    },

    /// Run a conformance test case against a capture
    Analyse {
        /// Input capture file
        #[arg(short, long)]
        input: String,

        /// Test case id, e.g. TD_COAP_CORE_01
        #[arg(short, long)]
        testcase: String,

        /// Output JSON report
        #[arg(short, long)]
        output: Option<String>,

        /// Print the full test log
        #[arg(long)]
        log: bool,
    },

    /// List implemented test cases
    Testcases {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compress or decompress a 6LoWPAN IPHC packet given as hex
    Iphc {
        /// Packet bytes as hex
        #[arg(short = 'x', long)]
        hex: String,

        /// Source link-layer address (2 or 8 bytes of hex)
        #[arg(long)]
        src: Option<String>,

        /// Destination link-layer address (2 or 8 bytes of hex)
        #[arg(long)]
        dst: Option<String>,

        /// Treat the input as IPv6 and compress it
        #[arg(long)]
        compress: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Execute command
    match cli.command {
        Commands::Summary {
            input,
            protocol,
            json,
            output,
        } => commands::summary::execute(
            &input,
            protocol.as_deref(),
            json,
            output.as_deref(),
            &cli.contexts,
        ),

        Commands::Dissect {
            input,
            protocol,
            output,
            text,
        } => commands::dissect::execute(
            &input,
            protocol.as_deref(),
            output.as_deref(),
            text,
            &cli.contexts,
        ),

        Commands::Analyse {
            input,
            testcase,
            output,
            log,
        } => commands::analyse::execute(&input, &testcase, output.as_deref(), log, &cli.contexts),

        Commands::Testcases { json } => commands::testcases::execute(json),

        Commands::Iphc {
            hex,
            src,
            dst,
            compress,
        } => commands::iphc::execute(
            &hex,
            src.as_deref(),
            dst.as_deref(),
            compress,
            &cli.contexts,
        )
        .map(|_| ()),
    }
}
