use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use solana_client::rpc_client::RpcClient;
use solana_program_metadata::metadata::upload_metadata;
use solana_program_metadata::{
    buffer, manage, reader, ClientContext, Compression, ContentKind, DataSource,
    Encoding, FeePolicy, Format, HttpFetcher, Outcome, ProgramMetadata,
    RecordSeeds, Tags, Upload, UrlFetcher, METADATA_PROGRAM_ID,
};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::keypair::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer;


/// Default RPC endpoint when neither a flag nor a config file gives one.
const DEFAULT_URL: &str = "http://127.0.0.1:8899";


type Result<T = (), E = Error> = core::result::Result<T, E>;


/// Uploads and downloads IDLs and program metadata.
#[derive(Parser)]
#[command(name = "program-metadata", version)]
struct Cli {
    #[command(flatten)]
    opts: Opts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Opts {
    /// Solana CLI configuration file.
    #[arg(short = 'C', long, global = true)]
    config: Option<String>,

    /// RPC URL or one of `localhost`, `devnet`, `testnet`, `mainnet-beta`
    /// (or their first letter).
    #[arg(short = 'u', long, global = true)]
    url: Option<String>,

    /// Keypair file of the signer paying for and authorising changes.
    #[arg(short = 'k', long, global = true)]
    keypair: Option<String>,

    /// Compute unit price in micro-lamports.
    #[arg(short = 'p', long, global = true, default_value_t = 0)]
    priority_fees: u64,

    /// Address of the metadata program.
    #[arg(long, global = true, default_value_t = METADATA_PROGRAM_ID)]
    program: Pubkey,

    /// Increases log verbosity; may be repeated.
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Manages the IDL record of a program.
    Idl {
        #[command(subcommand)]
        action: RecordCommand,
    },
    /// Manages the security metadata record of a program.
    Metadata {
        #[command(subcommand)]
        action: RecordCommand,
    },
    /// Manages staging buffers.
    Buffers {
        #[command(subcommand)]
        action: BufferCommand,
    },
    /// Lists records of an authority.
    Records {
        /// Authority to list records of; the signer by default.
        #[arg(long)]
        authority: Option<Pubkey>,
    },
    /// Prints address of a record.
    Address {
        program_id: Pubkey,
        #[arg(default_value = "idl")]
        seed: String,
        /// Derives the address of a record created by given signer.
        #[arg(long)]
        signer: Option<Pubkey>,
    },
}

#[derive(Subcommand)]
enum RecordCommand {
    /// Uploads content of a file.
    Upload {
        program_id: Pubkey,
        file: PathBuf,
        #[command(flatten)]
        tags: TagArgs,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Uploads a record pointing at a URL.
    UploadUrl {
        program_id: Pubkey,
        url: String,
        #[command(flatten)]
        tags: TagArgs,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Downloads and decodes a record.
    Download {
        program_id: Pubkey,
        /// Output file; standard output if not given.
        output: Option<PathBuf>,
        /// Reads the record created by given signer rather than the
        /// canonical one.
        #[arg(long)]
        signer: Option<Pubkey>,
    },
    /// Changes authority of a record.  Use the default address
    /// `11111111111111111111111111111111` to make it immutable.
    SetAuthority {
        program_id: Pubkey,
        new_authority: Pubkey,
        #[arg(long)]
        add_signer_seed: bool,
    },
    /// Closes a record and reclaims its deposit.
    Close {
        program_id: Pubkey,
        #[arg(long)]
        add_signer_seed: bool,
    },
}

#[derive(Args)]
struct TagArgs {
    #[arg(long, value_parser = parse_tag::<Format>, default_value = "json")]
    format: Format,
    #[arg(long, value_parser = parse_tag::<Encoding>, default_value = "utf8")]
    encoding: Encoding,
    #[arg(long, value_parser = parse_tag::<Compression>, default_value = "gzip")]
    compression: Compression,
}

#[derive(Args)]
struct TargetArgs {
    /// Derives the record address with the signer as extra seed.  Such
    /// records don’t require the program’s upgrade authority.
    #[arg(long)]
    add_signer_seed: bool,
    /// Stages the upload and prints the final transaction for given
    /// authority to sign instead of submitting it.
    #[arg(long, value_name = "AUTHORITY")]
    export: Option<Pubkey>,
}

#[derive(Subcommand)]
enum BufferCommand {
    /// Lists buffers of an authority.
    List {
        /// Authority to list buffers of; the signer by default.
        #[arg(long)]
        authority: Option<Pubkey>,
    },
    /// Closes buffers and reclaims their deposits.
    Close {
        #[arg(required = true)]
        buffers: Vec<Pubkey>,
    },
}

fn parse_tag<T>(value: &str) -> Result<T, String>
where
    T: core::str::FromStr<Err = solana_program_metadata::Error>,
{
    value.parse().map_err(|err: solana_program_metadata::Error| err.to_string())
}


fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.opts.verbose);
    if let Err(err) = run(cli) {
        eprintln!("{err}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Installs log subscriber.  `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}


/// Executes the command.
fn run(cli: Cli) -> Result {
    let env = Env::new(&cli.opts)?;
    match cli.command {
        Command::Idl { action } => record_command(&env, ContentKind::Idl, action),
        Command::Metadata { action } => {
            record_command(&env, ContentKind::Metadata, action)
        }
        Command::Buffers { action } => buffer_command(&env, action),
        Command::Records { authority } => {
            let authority = match authority {
                Some(authority) => authority,
                None => env.keypair()?.pubkey(),
            };
            let records =
                manage::list_records(&env.client, &env.metadata_program, &authority)?;
            for record in records {
                println!(
                    "{} {} for {} ({:?}, {} bytes, {} lamports)",
                    record.address,
                    record.header.kind,
                    record.header.program_id,
                    record.header.layout,
                    record.size,
                    record.lamports,
                );
            }
            Ok(())
        }
        Command::Address { program_id, seed, signer } => {
            let seeds = match signer {
                Some(signer) => RecordSeeds::with_signer(program_id, seed, signer),
                None => RecordSeeds::canonical(program_id, seed),
            };
            println!("{}", seeds.derive(&env.metadata_program)?.0);
            Ok(())
        }
    }
}

fn record_command(env: &Env, kind: ContentKind, action: RecordCommand) -> Result {
    match action {
        RecordCommand::Upload { program_id, file, tags, target } => {
            let content = std::fs::read(&file)
                .map_err(|err| Error::File { path: file.clone(), err })?;
            let keypair = env.keypair()?;
            let ctx = env.context(&keypair);
            let req = target.request(program_id, kind.clone(), tags.tags(DataSource::Direct));
            let outcome = if kind == ContentKind::Metadata && tags.format == Format::Json {
                let metadata = ProgramMetadata::from_json(&content)?;
                upload_metadata(&ctx, &req, &metadata)?
            } else {
                solana_program_metadata::upload(&ctx, &req, &content)?
            };
            report(&outcome);
            Ok(())
        }
        RecordCommand::UploadUrl { program_id, url, tags, target } => {
            let keypair = env.keypair()?;
            let ctx = env.context(&keypair);
            let req = target.request(program_id, kind, tags.tags(DataSource::Url));
            let fetcher = HttpFetcher::default();
            let outcome = solana_program_metadata::upload_url(
                &ctx,
                &req,
                &url,
                Some(&fetcher as &dyn UrlFetcher),
            )?;
            report(&outcome);
            Ok(())
        }
        RecordCommand::Download { program_id, output, signer } => {
            let seeds = match signer {
                Some(signer) => RecordSeeds::with_signer(program_id, kind.as_str(), signer),
                None => RecordSeeds::canonical(program_id, kind.as_str()),
            };
            let fetcher = HttpFetcher::default();
            let content = reader::fetch_by_seeds(
                &env.client,
                Some(&fetcher as &dyn UrlFetcher),
                &env.metadata_program,
                &seeds,
            )?;
            match output {
                Some(path) => std::fs::write(&path, &content)
                    .map_err(|err| Error::File { path, err }),
                None => Ok(std::io::stdout().write_all(&content)?),
            }
        }
        RecordCommand::SetAuthority { program_id, new_authority, add_signer_seed } => {
            let keypair = env.keypair()?;
            let ctx = env.context(&keypair);
            let address = env.record_address(&ctx, program_id, &kind, add_signer_seed)?;
            manage::set_authority(&ctx, &address, &new_authority)?;
            println!("Authority of {address} set to {new_authority}");
            Ok(())
        }
        RecordCommand::Close { program_id, add_signer_seed } => {
            let keypair = env.keypair()?;
            let ctx = env.context(&keypair);
            let address = env.record_address(&ctx, program_id, &kind, add_signer_seed)?;
            manage::close_record(&ctx, &address)?;
            println!("Closed {address}");
            Ok(())
        }
    }
}

fn buffer_command(env: &Env, action: BufferCommand) -> Result {
    match action {
        BufferCommand::List { authority } => {
            let authority = match authority {
                Some(authority) => authority,
                None => env.keypair()?.pubkey(),
            };
            let buffers = buffer::list(&env.client, &env.metadata_program, &authority)?;
            if buffers.is_empty() {
                eprintln!("No buffers owned by {authority}");
            }
            for info in buffers {
                println!(
                    "{} {} ({} bytes, {} lamports)",
                    info.address, info.header.kind, info.header.data_len, info.lamports,
                );
            }
            Ok(())
        }
        BufferCommand::Close { buffers } => {
            let keypair = env.keypair()?;
            let ctx = env.context(&keypair);
            for address in buffers {
                buffer::close(&ctx, &address)?;
                println!("Closed {address}");
            }
            Ok(())
        }
    }
}

/// Prints result of an upload.
fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Committed { address, signature } => {
            println!("Uploaded to {address}");
            if let Some(signature) = signature {
                println!("Signature: {signature}");
            }
        }
        Outcome::Exported(export) => {
            println!("Record: {}", export.address);
            println!("Buffer: {}", export.buffer);
            println!("Transaction (base64): {}", export.to_base64());
            eprintln!(
                "Once the transaction lands, close the buffer with \
                 `program-metadata buffers close {}`.",
                export.buffer
            );
        }
    }
}


impl TagArgs {
    fn tags(&self, source: DataSource) -> Tags {
        Tags {
            encoding: self.encoding,
            compression: self.compression,
            format: self.format,
            source,
        }
    }
}

impl TargetArgs {
    fn request(&self, program_id: Pubkey, kind: ContentKind, tags: Tags) -> Upload {
        Upload {
            signer_seeded: self.add_signer_seed,
            export: self.export,
            ..Upload::new(program_id, kind, tags)
        }
    }
}


/// Resolved connection settings.
struct Env {
    client: RpcClient,
    keypair_path: String,
    fees: FeePolicy,
    metadata_program: Pubkey,
}

impl Env {
    /// Resolves settings.  Flags take precedence over the configuration
    /// file which takes precedence over defaults.
    fn new(opts: &Opts) -> Result<Self> {
        let config = load_config(opts.config.as_deref())?;
        let url = opts
            .url
            .as_deref()
            .map(resolve_moniker)
            .or_else(|| config.as_ref().map(|config| config.json_rpc_url.clone()))
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let keypair_path = match opts.keypair.clone() {
            Some(path) => path,
            None => match config {
                Some(config) => config.keypair_path,
                None => default_keypair_path()?,
            },
        };
        tracing::debug!("using {url} with keypair {keypair_path}");
        Ok(Self {
            client: RpcClient::new_with_commitment(url, CommitmentConfig::confirmed()),
            keypair_path,
            fees: FeePolicy::with_priority_fee(opts.priority_fees),
            metadata_program: opts.program,
        })
    }

    fn keypair(&self) -> Result<Keypair> {
        read_keypair_file(&self.keypair_path).map_err(|err| Error::Keypair {
            path: self.keypair_path.clone(),
            reason: err.to_string(),
        })
    }

    fn context<'a>(&'a self, keypair: &'a Keypair) -> ClientContext<'a> {
        ClientContext::new(&self.client, keypair)
            .with_fees(self.fees)
            .with_metadata_program(self.metadata_program)
    }

    fn record_address(
        &self,
        ctx: &ClientContext,
        program_id: Pubkey,
        kind: &ContentKind,
        add_signer_seed: bool,
    ) -> Result<Pubkey> {
        let seeds = if add_signer_seed {
            RecordSeeds::with_signer(program_id, kind.as_str(), ctx.payer())
        } else {
            RecordSeeds::canonical(program_id, kind.as_str())
        };
        Ok(seeds.derive(&self.metadata_program)?.0)
    }
}

/// Loads Solana CLI configuration.
///
/// An explicitly given file must load.  The default file is used only if it
/// exists.
fn load_config(path: Option<&str>) -> Result<Option<solana_cli_config::Config>> {
    use solana_cli_config::{Config, CONFIG_FILE};

    match path {
        Some(path) => Config::load(path).map(Some).map_err(|err| Error::File {
            path: path.into(),
            err,
        }),
        None => {
            let default: &Option<String> = &CONFIG_FILE;
            Ok(default
                .as_ref()
                .filter(|path| std::path::Path::new(path).exists())
                .and_then(|path| Config::load(path).ok()))
        }
    }
}

fn resolve_moniker(url: &str) -> String {
    match url {
        "l" | "localhost" => DEFAULT_URL,
        "d" | "devnet" => "https://api.devnet.solana.com",
        "t" | "testnet" => "https://api.testnet.solana.com",
        "m" | "mainnet-beta" => "https://api.mainnet-beta.solana.com",
        url => url,
    }
    .to_string()
}

fn default_keypair_path() -> Result<String> {
    let home = std::env::var_os("HOME").ok_or(Error::Msg("HOME is not set"))?;
    let mut path = PathBuf::from(home);
    path.push(".config/solana/id.json");
    Ok(path.to_string_lossy().into_owned())
}


#[derive(derive_more::From, derive_more::Display)]
enum Error {
    Msg(&'static str),
    Lib(solana_program_metadata::Error),
    Io(std::io::Error),
    #[display("{}: {err}", path.display())]
    #[from(ignore)]
    File { path: PathBuf, err: std::io::Error },
    #[display("cannot read keypair from {path}: {reason}")]
    #[from(ignore)]
    Keypair { path: String, reason: String },
}
