// event identity
pub mod event {
    pub mod key;
    pub mod prng;
}

// physics derivations
pub mod physics {
    pub mod channel;
    pub mod fiducial;
    pub mod derive;
}

// selection cuts
pub mod selection {
    pub mod cuts;
}

// training / analysis partitioning
pub mod partition {
    pub mod candidate;
    pub mod builder;
}

pub mod error;

pub use error::{Error, Result};
