// Copyright 2025 SKIFF Authors.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the SKIFF project (Symbolic Kernel-free Intermediate Form for Frameworks).

//! SKIFF command-line backward synthesizer: load a forward graph from JSON,
//! run backward construction, and emit the result.

use std::collections::BTreeSet;
use std::fs;
use std::process;

use clap::Parser;

use skiff::{append_backward, backward, BlockDesc, OpNode};

#[derive(Parser, Debug)]
#[command(author, version, about = None, long_about = None)]
struct Cli {
    /// Input JSON file holding the forward graph.
    input: String,
    /// Treat the input as a flat block of descriptors instead of a nested
    /// operator tree.
    #[arg(long)]
    flat: bool,
    /// Forward variable names excluded from gradient computation (repeatable).
    #[arg(long = "no-grad", value_name = "VAR")]
    no_grad: Vec<String>,
    /// Emit the result as JSON instead of the stable text form.
    #[arg(long)]
    emit_json: bool,
    /// Only run synthesis and verification without emitting output.
    #[arg(long)]
    verify_only: bool,
}

fn main() {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(src) => src,
        Err(err) => {
            eprintln!("failed to read {}: {err}", cli.input);
            process::exit(1);
        }
    };

    let no_grad_vars: BTreeSet<String> = cli.no_grad.iter().cloned().collect();

    if cli.flat {
        run_flat(&source, &no_grad_vars, &cli);
    } else {
        run_nested(&source, &no_grad_vars, &cli);
    }
}

fn run_nested(source: &str, no_grad_vars: &BTreeSet<String>, cli: &Cli) {
    let forward: OpNode = match serde_json::from_str(source) {
        Ok(node) => node,
        Err(err) => {
            eprintln!("failed to parse {}: {err}", cli.input);
            process::exit(1);
        }
    };

    let products = match backward(&forward, no_grad_vars) {
        Ok(products) => products,
        Err(err) => {
            eprintln!("backward synthesis failed: {err}");
            process::exit(1);
        }
    };

    if cli.verify_only {
        return;
    }
    emit(&products.backward, cli.emit_json);
}

fn run_flat(source: &str, no_grad_vars: &BTreeSet<String>, cli: &Cli) {
    let mut block: BlockDesc = match serde_json::from_str(source) {
        Ok(block) => block,
        Err(err) => {
            eprintln!("failed to parse {}: {err}", cli.input);
            process::exit(1);
        }
    };

    if let Err(err) = append_backward(&mut block, no_grad_vars) {
        eprintln!("backward synthesis failed: {err}");
        process::exit(1);
    }

    if cli.verify_only {
        return;
    }
    emit(&block, cli.emit_json);
}

fn emit<T: serde::Serialize + std::fmt::Display>(value: &T, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("failed to serialize result: {err}");
                process::exit(1);
            }
        }
    } else {
        print!("{value}");
    }
}
