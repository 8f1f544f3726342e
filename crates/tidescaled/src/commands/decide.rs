use tidescale_core::ScalingParams;

/// Validate `params` and print what the policy would do.
pub fn decide(current: u32, cpu: f64, memory: f64, params: ScalingParams) -> anyhow::Result<()> {
    let action = evaluate(current, cpu, memory, &params)?;
    println!("{}", serde_json::to_string(&action)?);
    println!("{action}");
    Ok(())
}

fn evaluate(
    current: u32,
    cpu: f64,
    memory: f64,
    params: &ScalingParams,
) -> anyhow::Result<tidescale_core::Action> {
    params.validate()?;
    if !(cpu.is_finite() && memory.is_finite()) {
        anyhow::bail!("utilization must be a finite number");
    }
    Ok(tidescale_autoscale::decide(current, cpu, memory, params))
}
