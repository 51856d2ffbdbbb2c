// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SolEco Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::time::Duration;

use thiserror::Error;

/// Device fetch error types
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("device sent non-ASCII data")]
    NonAscii,

    #[error("empty response from device")]
    EmptyResponse,
}

pub type FetchResult<T> = Result<T, FetchError>;
