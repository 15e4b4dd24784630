use clap::Parser;
use log::{error, info};

use dslab_power_placement::core::allocation_policy::PowerVmAllocationPolicy;
use dslab_power_placement::core::config::PlannerConfig;
use dslab_power_placement::core::errors::PlacementError;

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to planner config
    #[clap(short, long, default_value = "config.yaml")]
    config: String,

    /// Number of re-optimization epochs
    #[clap(short, long, default_value_t = 5)]
    epochs: u32,

    /// Time between epochs in seconds
    #[clap(short, long, default_value_t = 10.)]
    step: f64,

    /// Path to save VM utilization log in CSV format
    #[clap(short, long)]
    utilization_log: Option<String>,
}

fn run(args: &Args) -> Result<(), PlacementError> {
    let config = PlannerConfig::from_file(&args.config)?;
    let mut policy = PowerVmAllocationPolicy::from_config(&config)?;
    let mut vms = config.build_vms(0, 0.)?;
    println!(
        "Policy {}: {} hosts, {} vms",
        policy.policy_desc(),
        policy.hosts().len(),
        vms.len()
    );

    for vm in vms.iter_mut() {
        if !policy.allocate_host_for_vm(vm) {
            println!("No host for {}", vm);
        }
    }
    println!("Initial power: {:.2}", policy.total_power());

    for epoch in 1..=args.epochs {
        let time = epoch as f64 * args.step;
        for vm_uid in policy.update_vms_processing(&mut vms, time) {
            println!("  vm {} keeps its previous reservation", vm_uid);
        }
        let plan = policy.optimize_allocation(&mut vms, time)?;
        println!("Epoch {} (time {}): {} migrations planned", epoch, time, plan.len());
        for entry in plan.iter() {
            println!("  vm {} : host {} -> host {}", entry.vm_uid, entry.source_host, entry.host_id);
            match vms.iter_mut().find(|vm| vm.uid() == entry.vm_uid) {
                Some(vm) => {
                    if !policy.migrate_vm(vm, entry.host_id)? {
                        info!("migration of {} to host {} is skipped", vm, entry.host_id);
                    }
                }
                None => error!("vm {} from the plan is not known", entry.vm_uid),
            }
        }
        println!("  total power: {:.2}", policy.total_power());
    }

    if let Some(path) = &args.utilization_log {
        policy.save_utilization_log(path)?;
        println!("Utilization log saved to {}", path);
    }
    Ok(())
}

fn main() {
    init_logger();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
