use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use hclscan::{
    apply_resource_filters,
    config::{self, Config as HclscanConfig, TargetConfig},
    load_evaluation, render_with_backend, Accessor, Evaluation, LoadOptions, OsFilesystem,
    Passthrough, Value,
};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "hclscan")]
#[command(about = "Static evaluation of Terraform module trees into resource records", long_about = None)]
struct Cli {
    /// Root module directory
    #[arg(long, default_value = ".")]
    input: PathBuf,

    /// Set a variable: --var key=value (repeatable)
    #[arg(long, value_parser = parse_key_val::<String, String>)]
    var: Vec<(String, String)>,

    /// Load variables from a .tfvars or .tfvars.json file. Can repeat.
    #[arg(long)]
    var_file: Vec<PathBuf>,

    /// Backend to use: json|ids (ignored if using config file)
    #[arg(long, default_value = "json")]
    backend: String,

    /// Include only these resource types (repeatable, `aws_s3_*` matches by prefix)
    #[arg(long = "include")]
    include_resources: Vec<String>,

    /// Exclude these resource types (repeatable)
    #[arg(long = "exclude")]
    exclude_resources: Vec<String>,

    /// Use hclscan.toml configuration file
    #[arg(long)]
    config: bool,

    /// Target name to run (when using config file)
    #[arg(long)]
    target: Option<String>,

    /// Enable strict mode (non-fatal errors fail the run)
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate and render resource records
    Resources {},
    /// Evaluate and report every non-fatal error
    Validate {},
    /// Print the term evaluation order
    Order {},
    /// Print where a resource attribute is declared
    Locate {
        /// Resource id, e.g. module.net.aws_subnet.s[0]
        resource: String,
        /// Attribute path inside the resource, e.g. ingress[1].cidr_blocks
        #[arg(default_value = "")]
        path: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.config && cli.command.is_none() {
        let hclscan_config = config::load_config()
            .with_context(|| "failed to load hclscan.toml")?
            .ok_or_else(|| anyhow!("hclscan.toml not found"))?;

        let targets_to_run = if let Some(name) = cli.target {
            vec![hclscan_config
                .targets
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| anyhow!("target '{}' not found in hclscan.toml", name))?
                .clone()]
        } else {
            hclscan_config.targets.clone()
        };

        for target in targets_to_run {
            run_target(&hclscan_config, &target, cli.strict)?;
        }
        return Ok(());
    }

    let options = LoadOptions {
        var_files: cli.var_file.clone(),
        vars: cli
            .var
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    };
    let evaluation = load_evaluation(&cli.input, &OsFilesystem, &options)
        .with_context(|| format!("evaluating {}", cli.input.display()))?;

    match cli.command.unwrap_or(Commands::Resources {}) {
        Commands::Resources {} => {
            check_errors(&evaluation, cli.strict)?;
            let resources = apply_resource_filters(
                evaluation.resources(&Passthrough),
                &cli.include_resources,
                &cli.exclude_resources,
            );
            print!("{}", render_with_backend(&cli.backend, &resources)?);
        }
        Commands::Validate {} => {
            let errors = evaluation.errors();
            for e in &errors {
                error!("{e}");
            }
            info!(
                "Evaluated: {} module(s), {} resource(s), {} term(s), {} error(s)",
                evaluation.analysis().modules().len(),
                evaluation.analysis().resources().len(),
                evaluation.order().len(),
                errors.len()
            );
            if cli.strict && !errors.is_empty() {
                bail!("{} error(s) in strict mode", errors.len());
            }
        }
        Commands::Order {} => {
            for name in evaluation.order() {
                println!("{name}");
            }
        }
        Commands::Locate { resource, path } => {
            let accessor: Accessor = path.parse()?;
            let stack = evaluation.location(&resource, &accessor);
            if stack.is_empty() {
                bail!("unknown resource '{resource}'");
            }
            for range in stack {
                println!("{range}");
            }
        }
    }

    Ok(())
}

fn check_errors(evaluation: &Evaluation, strict: bool) -> Result<()> {
    let errors = evaluation.errors();
    for e in &errors {
        warn!("{e}");
    }
    if strict && !errors.is_empty() {
        bail!("{} error(s) in strict mode", errors.len());
    }
    Ok(())
}

fn run_target(hclscan_config: &HclscanConfig, target: &TargetConfig, strict: bool) -> Result<()> {
    info!("Running target: {}", target.name);

    for (key, value) in &hclscan_config.settings.env {
        std::env::set_var(key, value);
    }

    let input_path = target
        .input
        .as_deref()
        .or(hclscan_config.settings.input.as_deref())
        .unwrap_or(".");

    let var_files = hclscan_config
        .settings
        .var_files
        .iter()
        .chain(&target.var_files)
        .map(PathBuf::from)
        .collect();
    let vars: BTreeMap<String, Value> = target.variable_values()?;
    let options = LoadOptions { var_files, vars };

    let evaluation = load_evaluation(Path::new(input_path), &OsFilesystem, &options)
        .with_context(|| format!("evaluating module tree at {}", input_path))?;
    check_errors(&evaluation, strict)?;

    let resources = apply_resource_filters(
        evaluation.resources(&Passthrough),
        &target.include,
        &target.exclude,
    );
    let artifact = render_with_backend(&target.backend, &resources)?;

    if let Some(output_path) = &target.output {
        let path = Path::new(output_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, artifact)?;
        info!("Wrote output to: {}", output_path);
    } else {
        print!("{}", artifact);
    }

    Ok(())
}

fn parse_key_val<K, V>(s: &str) -> Result<(K, V)>
where
    K: std::str::FromStr,
    V: std::str::FromStr,
    <K as std::str::FromStr>::Err: std::fmt::Display,
    <V as std::str::FromStr>::Err: std::fmt::Display,
{
    let pos = s.find('=').ok_or_else(|| anyhow!("expected key=value"))?;
    let key = s[..pos]
        .parse()
        .map_err(|e| anyhow!("failed to parse key: {}", e))?;
    let value = s[pos + 1..]
        .parse()
        .map_err(|e| anyhow!("failed to parse value: {}", e))?;
    Ok((key, value))
}
