//! Example: Resolving hosts and running commands with Rustadmin
//!
//! Declares the built-in `System` and `Service` types, resolves a few names
//! through their patterns and runs a command on the local machine.
//!
//! Run with `cargo run --example hosts`.

use rustadmin::prelude::*;
use rustadmin::spawn_command;
use rustadmin::{CommandEvent, CommandSpec};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    println!("=== Rustadmin Hosts Example ===\n");

    let config = ShellConfig::new().with_name("hosts-demo").with_timeout_ms(10_000);
    let system = match System::declare(config.clone()) {
        Ok(system) => system,
        Err(e) => {
            println!("Failed to declare System: {}", e);
            return;
        }
    };
    let service = match Service::declare(&system) {
        Ok(service) => service,
        Err(e) => {
            println!("Failed to declare Service: {}", e);
            return;
        }
    };

    let result = Scope::enter(|_| {
        let localhost = system.get("localhost")?;
        let remote = system.get("deploy@db1.example.com")?;
        let nginx = service.get("web1/nginx")?;
        Ok::<_, ResourceError>((localhost, remote, nginx))
    });

    let (localhost, remote, nginx) = match result {
        Ok(resolved) => resolved,
        Err(e) => {
            println!("Resolution failed: {}", e);
            return;
        }
    };

    for resource in [&localhost, &remote, &nginx] {
        println!(
            "{} via {}",
            resource,
            resource.provider_name().unwrap_or_else(|| "-".to_string())
        );
    }

    println!("\n=== Running on {} ===", localhost);
    match localhost.sh("uname -a").await {
        Ok(output) if output.success() => println!("{}", output.stdout),
        Ok(output) => println!("exit {:?}: {}", output.status, output.stderr),
        Err(e) => println!("Command failed: {}", e),
    }

    println!("\n=== Streaming output ===");
    let spec = CommandSpec::new(&config.shell).arg("-c").arg("echo one; sleep 1; echo two");
    match spawn_command(&spec, config.buffer_size) {
        Ok(mut events) => {
            while let Some(event) = events.next().await {
                match event {
                    CommandEvent::Stdout(line) => println!("out: {}", line),
                    CommandEvent::Stderr(line) => println!("err: {}", line),
                    CommandEvent::Exited(code) => println!("exited: {:?}", code),
                }
            }
        }
        Err(e) => println!("Failed to spawn: {}", e),
    }
}
