mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tactics::{AdMode, AoeShape, AoeTemplate, DamageDice, Dice, EngineConfig, Position, Vec3};

#[derive(Copy, Clone, ValueEnum)]
enum Adv {
    Normal,
    Advantage,
    Disadvantage,
}

#[derive(Copy, Clone, ValueEnum)]
enum Shape {
    Sphere,
    Cube,
    Cylinder,
    Cone,
    Line,
}

#[derive(Subcommand)]
enum Cmd {
    /// Roll a d20 multiple times with optional advantage/disadvantage
    Roll {
        /// RNG seed for determinism
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Advantage mode
        #[arg(long, value_enum, default_value_t = Adv::Normal)]
        adv: Adv,
        /// Number of rolls
        #[arg(long, default_value_t = 5)]
        rolls: u32,
    },
    /// Evaluate a damage formula such as 2d6+3
    Damage {
        formula: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Check whether a grid cell falls inside an area of effect
    Aoe {
        #[arg(long, value_enum)]
        shape: Shape,
        /// Size in distance units (radius, edge, length)
        #[arg(long)]
        size: f64,
        /// Template origin as x,y,z
        #[arg(long, value_parser = parse_position, default_value = "0,0,0")]
        origin: Position,
        /// Cell to test as x,y,z
        #[arg(long, value_parser = parse_position)]
        point: Position,
        /// Direction for cones and lines as x,y,z
        #[arg(long, value_parser = parse_position)]
        direction: Option<Position>,
        #[arg(long)]
        width: Option<f64>,
        #[arg(long)]
        height: Option<f64>,
    },
    /// Run the built-in skirmish and print every event as a JSON line
    Demo {
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Stop after this many rounds
        #[arg(long, default_value_t = 10)]
        rounds: u32,
    },
}

#[derive(Parser)]
#[command(name = "tactics")]
#[command(about = "Tactical combat engine harness")]
struct Cli {
    /// Engine config (YAML, or JSON by extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

fn to_mode(a: Adv) -> AdMode {
    match a {
        Adv::Normal => AdMode::Normal,
        Adv::Advantage => AdMode::Advantage,
        Adv::Disadvantage => AdMode::Disadvantage,
    }
}

fn to_shape(s: Shape) -> AoeShape {
    match s {
        Shape::Sphere => AoeShape::Sphere,
        Shape::Cube => AoeShape::Cube,
        Shape::Cylinder => AoeShape::Cylinder,
        Shape::Cone => AoeShape::Cone,
        Shape::Line => AoeShape::Line,
    }
}

fn parse_position(s: &str) -> Result<Position, String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|p| p.trim().parse::<i32>().map_err(|e| format!("`{p}`: {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y] => Ok(Position::new(*x, *y, 0)),
        [x, y, z] => Ok(Position::new(*x, *y, *z)),
        _ => Err(format!("expected x,y or x,y,z, got `{s}`")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.cmd {
        Cmd::Roll { seed, adv, rolls } => {
            let mode = to_mode(adv);
            let mut dice = Dice::from_seed(seed);
            for _ in 0..rolls {
                println!("{}", dice.d20(mode));
            }
        }
        Cmd::Damage { formula, seed, times } => {
            let dice_spec: DamageDice = formula
                .parse()
                .with_context(|| format!("cannot roll `{formula}`"))?;
            let mut dice = Dice::from_seed(seed);
            for _ in 0..times {
                let roll = dice.roll_dice(dice_spec);
                println!("{} = {:?} {:+} => {}", dice_spec, roll.rolls, roll.modifier, roll.total);
            }
        }
        Cmd::Aoe { shape, size, origin, point, direction, width, height } => {
            let mut template = AoeTemplate::new(to_shape(shape), size, origin);
            if let Some(d) = direction {
                template = template.with_direction(Vec3::new(d.x as f64, d.y as f64, d.z as f64));
            }
            if let Some(w) = width {
                template = template.with_width(w);
            }
            if let Some(h) = height {
                template = template.with_height(h);
            }
            let inside = template.contains(&point);
            println!(
                "({}, {}, {}) is {} the area",
                point.x,
                point.y,
                point.z,
                if inside { "inside" } else { "outside" }
            );
        }
        Cmd::Demo { seed, rounds } => {
            let config = EngineConfig { seed: Some(seed), auto_advance_delay_ms: 0, ..config };
            demo::run(config, rounds)?;
        }
    }
    Ok(())
}
