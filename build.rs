fn main() {
    // host builds (unit tests) link normally
    if std::env::var_os("CARGO_FEATURE_FIRMWARE").is_none() {
        return;
    }

    linker_be_nice();
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_defmt_timestamp" => {
                    eprintln!();
                    eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script and you have included `use defmt_rtt as _;`");
                    eprintln!();
                }
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                "_embassy_time_schedule_wake" | "_embassy_time_now" => {
                    eprintln!();
                    eprintln!("💡 No embassy time driver found - make sure `esp_hal_embassy::init` is called and `esp-hal-embassy` is a dependency");
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    match std::env::current_exe() {
        Ok(exe) => println!("cargo:rustc-link-arg=--error-handling-script={}", exe.display()),
        Err(e) => println!("cargo:warning=linker hints unavailable: {}", e),
    }
}
