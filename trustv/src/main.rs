#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

#[macro_use]
extern crate cfg_if;

mod args;
mod options;

use clap::Parser;
use log::{debug, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::args::TrustvArgs;
use crate::options::run;

fn configure_logging(args: &TrustvArgs) {
    if let Some(logging_config) = &args.logging_config {
        match log4rs::init_file(logging_config, Default::default()) {
            Ok(()) => return,
            Err(e) => println!(
                "ERROR: failed to configure logging using {} with {:?}. Using default logging configuration.",
                logging_config, e
            ),
        }
    }

    // if there's no config, prepare one using stdout
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    match Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
    {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                println!(
                    "ERROR: failed to configure logging for stdout with {:?}. Continuing without logging.",
                    e
                );
            }
        }
        Err(e) => {
            println!(
                "ERROR: failed to prepare default logging configuration with {:?}. Continuing without logging",
                e
            );
        }
    }
}

/// Point of entry for trustv.
fn main() {
    let args = TrustvArgs::parse();
    configure_logging(&args);
    debug!("trustv start");

    let outcome = run(&args);
    match outcome {
        options::Outcome::Valid => println!("Result: VALID"),
        options::Outcome::Invalid => println!("Result: INVALID"),
        options::Outcome::ConfigurationError => println!("Result: CONFIGURATION ERROR"),
    }

    debug!("trustv end");
    std::process::exit(outcome.exit_code());
}
