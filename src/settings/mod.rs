use clap::{Parser, Subcommand, value_parser};
use std::path::PathBuf;
use std::str::FromStr;

const VERSION: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => env!("CARGO_PKG_VERSION"),
};

#[derive(Parser, Debug)]
#[command(name = "fxrt")]
#[command(version = VERSION)]
#[command(about = "Loads compiled effect binaries and shows what applying their passes does")]
pub struct CliArgs {
    /// Drop names, annotations and bytecode once the effect is loaded (apply: once it is bound).
    #[arg(long, global = true, env = "FXRT_OPTIMIZE")]
    pub optimize: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the groups, techniques, passes and variables of an effect.
    Inspect { file: PathBuf },
    /// Bind an effect to a recording device and apply one pass.
    Apply {
        file: PathBuf,
        #[arg(long)]
        group: Option<String>,
        /// Defaults to the first technique.
        #[arg(long)]
        technique: Option<String>,
        /// Defaults to the first pass of the technique.
        #[arg(long)]
        pass: Option<String>,
        /// Numeric variable value applied before the pass, e.g. `Color=0,1,0,1`.
        #[arg(long = "set", value_parser = value_parser!(VariableOverride))]
        overrides: Vec<VariableOverride>,
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Write the built in sample effect.
    Sample { out: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableOverride {
    pub name: String,
    pub values: Vec<f32>,
}

impl FromStr for VariableOverride {
    type Err = String;

    // name=a,b,c
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, values)) = s.split_once('=') else {
            return Err("Expected NAME=VALUES".to_string());
        };
        let name = name.trim();
        if name.is_empty() {
            return Err("Missing variable name".to_string());
        }

        let values = values
            .split(',')
            .map(|value| value.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| format!("Could not parse the values of {}: {}", name, err))?;

        Ok(VariableOverride {
            name: name.to_string(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let parsed = VariableOverride::from_str("Color = 0, 1,0.5 ,1").unwrap();
        assert_eq!(parsed.name, "Color");
        assert_eq!(parsed.values, vec![0.0, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn rejects_malformed_overrides() {
        assert!(VariableOverride::from_str("Color").is_err());
        assert!(VariableOverride::from_str("=1").is_err());
        assert!(VariableOverride::from_str("Color=1,x").is_err());
    }
}
