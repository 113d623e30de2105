#![allow(non_snake_case)]

//! Compile the Heisenberg MPO described by a TOML file and save it.
//!
//! Usage: `heisenberg_ladder [config.toml] [output dir]`
//!
//! Without a config file, a 4-site spin-1/2 chain with `J = 1` is compiled.
//! Set `RUST_LOG` to override the default `info` log level.

use std::path::PathBuf;
use flexi_logger::Logger;
use log::{ info, warn };
use ndarray as nd;
use num_complex::Complex64 as C64;
use ladder_mpo::{
    write_npz,
    config::Config,
    dense,
    hams::Heisenberg,
    io::Persist,
    mpo::MPOError,
    sites::SpinSites,
};

fn main() -> anyhow::Result<()> {
    let _logger = Logger::try_with_env_or_str("info")?.start()?;

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            info!("reading config from {path}");
            Config::from_file(&path)?
        },
        None => Config::default(),
    };
    let outdir = PathBuf::from(args.next().unwrap_or_else(|| "output".into()));
    std::fs::create_dir_all(&outdir)?;

    let sites = SpinSites::new(config.chain.ns, config.chain.spin);
    let H = Heisenberg::with_params(&sites, config.params)?
        .with_context(config.context);
    let mpo = H.build()?;
    info!("bond dimensions: {:?}", mpo.bond_dims());
    if config.context.print_data {
        println!("{}", mpo.display_with(H.context()));
    }
    mpo.write_to_file(outdir.join("heisenberg_ladder.npz"))?;

    match mpo.to_dense() {
        Ok(H_mpo) => {
            let H_ref = dense::heisenberg_dense(&sites, &config.params)?;
            let err: f64
                = (&H_mpo - &H_ref).iter()
                .map(|x| x.norm())
                .fold(0.0, f64::max);
            if err > 1e-10 {
                warn!("MPO deviates from the dense Hamiltonian by {err:.3e}");
            } else {
                info!("MPO matches the dense Hamiltonian (max deviation {err:.3e})");
            }
            let bond_dims: nd::Array1<u64>
                = mpo.bond_dims().into_iter().map(|k| k as u64).collect();
            let diag: nd::Array1<C64> = H_mpo.diag().to_owned();
            write_npz!(
                outdir.join("heisenberg_ladder_dense.npz"),
                arrays: {
                    "H" => &H_mpo,
                    "diag" => &diag,
                    "bond_dims" => &bond_dims,
                }
            )?;
        },
        Err(MPOError::TooLarge(D)) => {
            info!("chain too large for a dense check (dimension {D}); skipping");
        },
        Err(e) => { return Err(e.into()); },
    }
    Ok(())
}
