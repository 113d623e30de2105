#![allow(non_snake_case)]

//! Compile Heisenberg Hamiltonians on spin chains and wrapped ladders into
//! matrix product operators whose bond dimension depends only on the number of
//! ladder legs.

pub mod spin;
pub mod sites;
pub mod index;
pub mod tensor;
pub mod lattice;
pub mod mpo;
pub mod hams;
pub mod dense;
pub mod config;
pub mod io;
