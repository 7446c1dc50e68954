use cylflow::trace::{read_trace, TraceEvent};

fn usage() -> &'static str {
    "Usage:
  cylflow_trace info <trace.jsonl>
  cylflow_trace forces <trace.jsonl>"
}

fn cmd_info(path: &str) -> Result<(), String> {
    let events = read_trace(path).map_err(|err| err.to_string())?;

    let mut steps = 0usize;
    let mut wall_ms = 0.0f64;
    let mut momentum_its = 0u64;
    let mut pressure_its = 0u64;
    let mut unconverged = 0usize;
    let mut max_cfl: f64 = 0.0;
    let mut max_divergence: f64 = 0.0;
    let mut header_seen = false;

    for event in &events {
        match event {
            TraceEvent::Header(h) => {
                if header_seen {
                    return Err(format!("trace file '{}' has multiple Header events", path));
                }
                header_seen = true;
                println!("format version: {}", h.format_version);
                println!(
                    "mesh: {} elements, {} velocity DOFs, {} pressure DOFs, min edge {:.4e}",
                    h.mesh.elements, h.mesh.velocity_dofs, h.mesh.pressure_dofs, h.mesh.min_edge_length
                );
                println!(
                    "run: {} order {}, Re {}, dt {}, t_final {}",
                    h.config.mesh_path.display(),
                    h.config.order,
                    h.config.reynolds,
                    h.config.dt,
                    h.config.final_time
                );
            }
            TraceEvent::Step(s) => {
                steps += 1;
                wall_ms += s.wall_time_ms as f64;
                for solve in &s.linear_solves {
                    match solve.stage.as_str() {
                        "momentum" => momentum_its += solve.iterations as u64,
                        "pressure" => pressure_its += solve.iterations as u64,
                        _ => {}
                    }
                    if !solve.converged {
                        unconverged += 1;
                    }
                }
                max_cfl = max_cfl.max(s.cfl.unwrap_or(0.0));
                max_divergence = max_divergence.max(s.divergence.unwrap_or(0.0));
            }
            TraceEvent::Footer(f) => {
                println!(
                    "footer: {} steps, {} non-converged solves, St {}",
                    f.steps,
                    f.non_converged_solves,
                    f.strouhal
                        .map(|st| format!("{:.4}", st))
                        .unwrap_or_else(|| "n/a".to_string())
                );
            }
        }
    }

    if !header_seen {
        return Err(format!("trace file '{}' is missing a Header event", path));
    }
    if steps > 0 {
        println!(
            "steps: {} ({:.2} ms/step), avg iterations momentum {:.1} pressure {:.1}",
            steps,
            wall_ms / steps as f64,
            momentum_its as f64 / steps as f64,
            pressure_its as f64 / steps as f64
        );
        println!(
            "max CFL {:.3}, max |Du| {:.3e}, unconverged solves {}",
            max_cfl, max_divergence, unconverged
        );
    }
    Ok(())
}

fn cmd_forces(path: &str) -> Result<(), String> {
    let events = read_trace(path).map_err(|err| err.to_string())?;
    println!("step,time,drag,lift");
    for event in events {
        if let TraceEvent::Step(s) = event {
            if let (Some(drag), Some(lift)) = (s.drag, s.lift) {
                println!("{},{},{:e},{:e}", s.step, s.sim_time, drag, lift);
            }
        }
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("{}", usage());
        std::process::exit(2);
    }

    let result = match args[1].as_str() {
        "info" => cmd_info(&args[2]),
        "forces" => cmd_forces(&args[2]),
        _ => Err(format!("unknown command '{}'\n\n{}", args[1], usage())),
    };

    if let Err(err) = result {
        eprintln!("[cylflow_trace] {err}");
        std::process::exit(1);
    }
}
