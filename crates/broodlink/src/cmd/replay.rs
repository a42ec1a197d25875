use std::fs::File;
use std::io::BufReader;

use broodlink_state::Replayer;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use crate::cmd::ReplayArgs;
use crate::exit::{io_error, state_error, CliResult, SUCCESS};

pub fn run(args: ReplayArgs) -> CliResult<i32> {
    let file = File::open(&args.path).map_err(|err| io_error("opening replay", err))?;
    let mut reader = BufReader::new(file);
    let replayer =
        Replayer::read_from(&mut reader).map_err(|err| state_error("reading replay", err))?;

    println!(
        "map: {}x{} build tiles, {} creep bytes",
        replayer.map_width(),
        replayer.map_height(),
        replayer.map_creep().len()
    );
    println!("frames: {}", replayer.len());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["player", "max units"]);
    for (pid, count) in replayer.num_units_table() {
        table.add_row(vec![Cell::new(pid), Cell::new(count)]);
    }
    println!("{table}");

    if let Some(index) = args.frame {
        let Some(frame) = replayer.frame(index) else {
            return Err(crate::exit::CliError::new(
                crate::exit::FAILURE,
                format!("frame index {index} out of range ({} frames)", replayer.len()),
            ));
        };

        println!(
            "frame {index}: reward={} terminal={} bullets={}",
            frame.reward,
            frame.is_terminal,
            frame.bullets.len()
        );
        let mut units = Table::new();
        units
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["player", "id", "type", "x", "y", "hp", "shield", "orders"]);
        for (pid, list) in &frame.units {
            for unit in list {
                units.add_row(vec![
                    Cell::new(pid),
                    Cell::new(unit.id),
                    Cell::new(unit.unit_type),
                    Cell::new(unit.x),
                    Cell::new(unit.y),
                    Cell::new(format!("{}/{}", unit.health, unit.max_health)),
                    Cell::new(format!("{}/{}", unit.shield, unit.max_shield)),
                    Cell::new(unit.orders.len()),
                ]);
            }
        }
        println!("{units}");
    }

    Ok(SUCCESS)
}
