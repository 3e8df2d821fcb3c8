use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use convtile::{
    format_step_line, Dispatcher, HardwareLimits, PlanDeserialize, PlanLoader, TilingPlan,
};

struct Args {
    plan: PathBuf,
    limits: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> Result<Args> {
    let mut plan = None;
    let mut limits = None;
    let mut json = false;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--limits" => {
                let path = args.next().ok_or_else(|| anyhow!("--limits needs a path"))?;
                limits = Some(PathBuf::from(path));
            }
            other if other.starts_with("--") => return Err(anyhow!("unknown flag {other}")),
            other => plan = Some(PathBuf::from(other)),
        }
    }
    let plan = plan.ok_or_else(|| {
        anyhow!("usage: convtile-trace <plan.json|plan.ctpl> [--limits settings.json] [--json]")
    })?;
    Ok(Args { plan, limits, json })
}

fn load_plan(path: &Path) -> Result<TilingPlan> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        let text =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        PlanDeserialize::from_json_str(&text)
    } else {
        PlanLoader::open(path)?.plan()
    }
}

fn load_limits(path: Option<&Path>) -> Result<HardwareLimits> {
    match path {
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            HardwareLimits::from_json_str(&text)
        }
        None => Ok(HardwareLimits::default()),
    }
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let plan = load_plan(&args.plan)?;
    let limits = load_limits(args.limits.as_deref())?;
    let report = Dispatcher::new(plan, limits)?
        .with_trace()
        .with_timer()
        .run()?;

    if args.json {
        println!("{}", report.trace_json_string()?);
        return Ok(());
    }
    println!("invocation {}", report.invocation);
    for engine in [&report.vector, &report.matrix] {
        for event in &engine.trace {
            println!("{}", format_step_line(event));
        }
        println!(
            "{} engine: {} steps, {} ops, {} ns",
            engine.engine,
            engine.steps,
            engine.ops.len(),
            engine.elapsed_ns.unwrap_or(0)
        );
    }
    println!("{} handshake records", report.sync_log.len());
    Ok(())
}
