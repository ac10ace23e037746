use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use keycypher_core::embedded::{KEYSTORE_PATH_ENV, KEY_ROOT_ENV};
use keycypher_core::provider::{FileKeyStore, NewKey};
use keycypher_core::{CoreBuilder, KeyCore};
use keycypher_spec::{CypherSpecification, KeyReference, Password};
use rand::RngCore;
use serde_json::json;
use std::path::PathBuf;
use zeroize::Zeroizing;

mod telemetry;

#[derive(Parser)]
#[command(name = "keycypher", version, about = "Keycypher key store and cypher CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(subcommand)]
    Keystore(KeystoreCmd),
    /// Encrypt TEXT and print it as Base64.
    Encrypt(CypherCmd),
    /// Decrypt Base64 TEXT and print the plaintext.
    Decrypt(CypherCmd),
    /// List registered cypher algorithms.
    Algorithms,
}

#[derive(Subcommand)]
enum KeystoreCmd {
    /// Create an empty keystore.
    Init(StoreArgs),
    /// Generate a key as version 1 of a new alias. Fails if the alias exists.
    Add(GenerateArgs),
    /// Append a freshly generated version to an alias.
    Rotate(GenerateArgs),
    /// Revoke one version of an alias.
    Revoke(RevokeArgs),
    /// List aliases and versions.
    List(ListArgs),
}

#[derive(Args)]
struct StoreArgs {
    #[arg(long, env = KEYSTORE_PATH_ENV)]
    keystore: PathBuf,
    #[arg(long, env = KEY_ROOT_ENV, default_value = "keys")]
    root: String,
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    alias: String,
    #[arg(long, default_value = "AES")]
    algorithm: String,
    /// Key size in bits.
    #[arg(long, default_value_t = 256)]
    size: usize,
    /// Environment variable holding the password that seals the key.
    #[arg(long)]
    password_env: Option<String>,
}

#[derive(Args)]
struct RevokeArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    alias: String,
    #[arg(long)]
    version: u32,
}

#[derive(Args)]
struct ListArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CypherCmd {
    #[command(flatten)]
    store: StoreArgs,
    /// Key path, optionally with an `@version` suffix.
    #[arg(long)]
    key: String,
    #[arg(long, default_value = "A256GCM")]
    algorithm: String,
    #[arg(long)]
    password_env: Option<String>,
    text: String,
}

fn main() -> Result<()> {
    telemetry::init()?;
    let cli = Cli::parse();
    match cli.command {
        Command::Keystore(cmd) => handle_keystore(cmd),
        Command::Encrypt(cmd) => handle_encrypt(cmd),
        Command::Decrypt(cmd) => handle_decrypt(cmd),
        Command::Algorithms => handle_algorithms(),
    }
}

fn handle_keystore(cmd: KeystoreCmd) -> Result<()> {
    match cmd {
        KeystoreCmd::Init(args) => {
            FileKeyStore::create(&args.keystore, args.root).context("failed to create keystore")?;
            println!("Created keystore {}", args.keystore.display());
        }
        KeystoreCmd::Add(args) => {
            let store = FileKeyStore::open(&args.store.keystore, args.store.root.as_str());
            let existing = store.list().context("failed to read keystore")?;
            if existing.iter().any(|info| info.alias == args.alias) {
                bail!(
                    "alias `{}` already exists; use `keystore rotate` to add a version",
                    args.alias
                );
            }
            let material = generate_key(args.size)?;
            let password = read_password(args.password_env.as_deref())?;
            let version = store
                .add_key(
                    &args.alias,
                    &args.algorithm,
                    NewKey::Secret(&material),
                    password.as_ref(),
                )
                .with_context(|| format!("failed to add key `{}`", args.alias))?;
            println!("{}/{}@{version}", store.root(), args.alias);
        }
        KeystoreCmd::Rotate(args) => {
            let store = FileKeyStore::open(&args.store.keystore, args.store.root.as_str());
            let material = generate_key(args.size)?;
            let password = read_password(args.password_env.as_deref())?;
            let version = store
                .rotate(&args.alias, &material, password.as_ref())
                .with_context(|| format!("failed to rotate key `{}`", args.alias))?;
            println!("{}/{}@{version}", store.root(), args.alias);
        }
        KeystoreCmd::Revoke(args) => {
            let store = FileKeyStore::open(&args.store.keystore, args.store.root.as_str());
            store
                .revoke(&args.alias, args.version)
                .with_context(|| format!("failed to revoke `{}@{}`", args.alias, args.version))?;
            println!("Revoked {}/{}@{}", store.root(), args.alias, args.version);
        }
        KeystoreCmd::List(args) => {
            let store = FileKeyStore::open(&args.store.keystore, args.store.root.as_str());
            let keys = store.list().context("failed to read keystore")?;
            if args.json {
                let rows: Vec<_> = keys
                    .iter()
                    .map(|info| {
                        json!({
                            "alias": info.alias,
                            "algorithm": info.algorithm,
                            "version": info.version,
                            "key_type": info.key_type.as_str(),
                            "protected": info.protected,
                            "revoked": info.revoked,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for info in keys {
                    let mut flags = Vec::new();
                    if info.protected {
                        flags.push("protected");
                    }
                    if info.revoked {
                        flags.push("revoked");
                    }
                    println!(
                        "{}@{}\t{}\t{}\t{}",
                        info.alias,
                        info.version,
                        info.algorithm,
                        info.key_type,
                        flags.join(",")
                    );
                }
            }
        }
    }
    Ok(())
}

fn handle_encrypt(cmd: CypherCmd) -> Result<()> {
    let core = open_core(&cmd.store)?;
    let strings = core
        .string_cypher(&CypherSpecification::new(cmd.algorithm.as_str()), key_reference(&cmd)?)
        .context("failed to prepare cypher")?;
    let sealed = strings
        .encrypt(Some(cmd.text.as_str()))
        .context("encryption failed")?
        .ok_or_else(|| anyhow!("nothing to encrypt"))?;
    core.close()?;
    println!("{sealed}");
    Ok(())
}

fn handle_decrypt(cmd: CypherCmd) -> Result<()> {
    let core = open_core(&cmd.store)?;
    let strings = core
        .string_cypher(&CypherSpecification::new(cmd.algorithm.as_str()), key_reference(&cmd)?)
        .context("failed to prepare cypher")?;
    let plaintext = strings
        .decrypt(Some(cmd.text.trim()))
        .context("decryption failed")?
        .ok_or_else(|| anyhow!("nothing to decrypt"))?;
    core.close()?;
    println!("{plaintext}");
    Ok(())
}

fn handle_algorithms() -> Result<()> {
    let core = CoreBuilder::from_env()?
        .build()
        .context("failed to start key core")?;
    for name in core.cypher_service().algorithms()? {
        println!("{name}");
    }
    core.close()?;
    Ok(())
}

fn open_core(store: &StoreArgs) -> Result<KeyCore> {
    tracing::debug!(keystore = %store.keystore.display(), root = %store.root, "opening key core");
    CoreBuilder::from_env()?
        .keystore_path(&store.keystore)
        .key_root(store.root.as_str())
        .cache_capacity(0)
        .build()
        .with_context(|| format!("failed to open keystore {}", store.keystore.display()))
}

fn key_reference(cmd: &CypherCmd) -> Result<KeyReference> {
    Ok(match read_password(cmd.password_env.as_deref())? {
        Some(password) => KeyReference::with_password(cmd.key.as_str(), password),
        None => KeyReference::new(cmd.key.as_str()),
    })
}

fn read_password(var: Option<&str>) -> Result<Option<Password>> {
    let Some(var) = var else {
        return Ok(None);
    };
    let value = std::env::var(var).with_context(|| format!("password variable {var} is not set"))?;
    if value.is_empty() {
        bail!("password variable {var} is empty");
    }
    Ok(Some(Password::from_string(value)))
}

fn generate_key(bits: usize) -> Result<Zeroizing<Vec<u8>>> {
    if bits == 0 || bits % 8 != 0 {
        bail!("key size must be a positive multiple of 8 bits, got {bits}");
    }
    let mut material = Zeroizing::new(vec![0u8; bits / 8]);
    rand::rng().fill_bytes(&mut material);
    Ok(material)
}
