use clap::Parser;
use rust_fssh::{read_run_file, PotentialOracle, Result, SurfaceHopping};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "tully_simple.yml")]
    config: String,

    /// Override the number of samples in the run file
    #[arg(short, long)]
    samples: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let run_file = read_run_file(&args.config)?;
    let num_samples = args.samples.unwrap_or(run_file.num_samples);
    let oracle = run_file.model.build();
    let num_states = oracle.num_states();

    log::info!(
        "{} samples, {} steps of dt = {}, {:?} propagation, decoherence {}",
        num_samples,
        run_file.n_steps,
        run_file.simulation.dt,
        run_file.simulation.propagation,
        if run_file.simulation.decoherence { "on" } else { "off" }
    );

    let mut ensemble = SurfaceHopping::from_initial(oracle, run_file.simulation, &run_file.initial, num_samples)?;
    let log_interval = run_file.log_interval.max(1);
    let mut hops = 0;
    let mut last = None;

    ensemble.run_with(run_file.n_steps, |report| {
        hops += report.hops();
        if report.step % log_interval == 0 {
            log::info!(
                "step {:>6}: populations {:.4?}, surfaces {:.3?}, {} hops so far",
                report.step,
                report.mean_populations(),
                report.surface_fractions(num_states),
                hops
            );
        }
        last = Some((report.mean_populations(), report.surface_fractions(num_states)));
        std::ops::ControlFlow::Continue(())
    })?;

    let excluded = ensemble.samples().iter().filter(|s| !s.is_active()).count();
    if let Some((populations, surfaces)) = last {
        println!("Surface Hopping Results");
        println!("-----------------------");
        println!("Number of samples: {} ({} excluded)", num_samples, excluded);
        println!("Number of steps: {}", ensemble.steps_done());
        println!("Total hops: {}", hops);
        println!("Final populations: {:.6?}", populations);
        println!("Final surface fractions: {:.6?}", surfaces);
    }
    Ok(())
}
