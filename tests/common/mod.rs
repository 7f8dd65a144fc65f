//! Shared fixtures for the workflow tests
//!
//! A temporary directory stands in for the mounted image and a scripted
//! executor stands in for the host tools.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use pinc_provision::command_runner::{CommandExecutor, CommandOutput};
use pinc_provision::command_traits::HostCommand;
use pinc_provision::config_file::ProvisionConfig;
use pinc_provision::error::Result;
use pinc_provision::image::ImagePath;
use pinc_provision::process_guard;
use tempfile::TempDir;

pub const KPARTX_OUTPUT: &str = "\
add map loop0p1 (253:0): 0 524288 linear 7:0 8192
add map loop0p2 (253:1): 0 3653632 linear 7:0 532480
";

pub const IPTABLES_SAVE_OUTPUT: &str = "\
*nat
:PREROUTING ACCEPT [0:0]
-A POSTROUTING -o eth0 -j MASQUERADE
COMMIT
";

// =============================================================================
// Scripted executor
// =============================================================================

/// Records every command and answers with canned output.
pub struct ScriptedExecutor {
    pub calls: RefCell<Vec<HostCommand>>,
    pub kpartx_output: String,
    /// Command-line prefix that fails, and the exit code it fails with
    pub fail_on: Option<(String, i32)>,
    /// Command-line prefix during which a signal arrives, killing the command
    pub interrupt_on: Option<(String, Signal)>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            kpartx_output: KPARTX_OUTPUT.to_string(),
            fail_on: None,
            interrupt_on: None,
        }
    }

    pub fn failing_on(prefix: &str, code: i32) -> Self {
        Self {
            fail_on: Some((prefix.to_string(), code)),
            ..Self::new()
        }
    }

    /// Raise `signal` while the command starting with `prefix` runs.
    ///
    /// Needs `process_guard::init_signal_handlers` to have run; only one
    /// signal may be raised per test binary.
    pub fn interrupted_on(prefix: &str, signal: Signal) -> Self {
        Self {
            interrupt_on: Some((prefix.to_string(), signal)),
            ..Self::new()
        }
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.command_line()).collect()
    }

    pub fn position(&self, line: &str) -> Option<usize> {
        self.command_lines().iter().position(|l| l == line)
    }
}

pub fn generator_output(keyword: &str) -> &'static str {
    match keyword {
        "interfaces" => "auto lo\niface lo inet loopback\n\nallow-hotplug wlan0\niface wlan0 inet static\n",
        "hostapd" => "interface=wlan0\nssid=pinc\nchannel=6\n",
        "dhcpd" => "subnet 192.168.42.0 netmask 255.255.255.0 {\n}\n",
        "dhcpd_devices" => "wlan0\n",
        "iptables" => "iptables -t nat -A POSTROUTING -o eth0 -j MASQUERADE\n",
        "tc" => "#!/bin/sh\ntc qdisc add dev wlan0 root handle 1: htb\n",
        _ => "",
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &HostCommand) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(command.clone());
        let line = command.command_line();

        if let Some((prefix, sig)) = &self.interrupt_on {
            if line.starts_with(prefix.as_str()) {
                signal::raise(*sig).expect("raise signal");
                wait_for_interrupt();
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    success: false,
                });
            }
        }

        if let Some((prefix, code)) = &self.fail_on {
            if line.starts_with(prefix.as_str()) {
                return Ok(CommandOutput::failed(*code, "simulated failure"));
            }
        }

        let first_arg = command.args.first().map(String::as_str).unwrap_or("");
        let stdout = match command.program.as_str() {
            "kpartx" if first_arg == "-av" => self.kpartx_output.as_str(),
            "jenny" => generator_output(first_arg),
            "iptables-save" => IPTABLES_SAVE_OUTPUT,
            _ => "",
        };
        Ok(CommandOutput::ok(stdout))
    }
}

// =============================================================================
// Fixture
// =============================================================================

/// A fake image root plus the host-side files the workflow reads.
pub struct Fixture {
    pub dir: TempDir,
    pub root: PathBuf,
    pub image: ImagePath,
    pub config: ProvisionConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("rpi");
        let host = dir.path().join("host");
        let binfmt_dir = dir.path().join("binfmt_misc");

        for sub in ["usr/bin", "etc/default", "dev", "proc", "sys"] {
            fs::create_dir_all(root.join(sub)).expect("create image dir");
        }
        fs::create_dir_all(&host).expect("create host dir");
        fs::create_dir_all(&binfmt_dir).expect("create binfmt dir");

        fs::write(
            root.join("etc/ld.so.preload"),
            "/usr/lib/arm-linux-gnueabihf/libarmmem-${PLATFORM}.so\n",
        )
        .expect("write preload");
        fs::write(
            root.join("etc/default/hostapd"),
            "# Defaults for hostapd initscript\n#DAEMON_CONF=\"\"\n#DAEMON_OPTS=\"\"\n",
        )
        .expect("write hostapd defaults");
        fs::write(
            root.join("etc/default/isc-dhcp-server"),
            "INTERFACESv4=\"\"\nINTERFACESv6=\"\"\n",
        )
        .expect("write dhcp defaults");
        fs::write(root.join("etc/sysctl.conf"), "#net.ipv4.ip_forward=1\n")
            .expect("write sysctl.conf");

        let emulator = host.join("qemu-arm-static");
        fs::write(&emulator, b"\x7fELF").expect("write emulator");

        fs::write(dir.path().join("raspbian.img"), b"").expect("write image");
        let image =
            ImagePath::resolve(Path::new("raspbian.img"), dir.path()).expect("resolve image");

        let config = ProvisionConfig {
            mount_point: root.clone(),
            emulator,
            binfmt_dir,
            ..Default::default()
        };

        Self {
            dir,
            root,
            image,
            config,
        }
    }

    pub fn read(&self, image_path: &str) -> String {
        fs::read_to_string(self.root.join(image_path.trim_start_matches('/')))
            .unwrap_or_else(|e| panic!("read {}: {}", image_path, e))
    }

    pub fn exists(&self, image_path: &str) -> bool {
        self.root.join(image_path.trim_start_matches('/')).exists()
    }

    pub fn host_path(&self, image_path: &str) -> String {
        self.root
            .join(image_path.trim_start_matches('/'))
            .display()
            .to_string()
    }
}

/// Block until the signal thread has raised the interrupt flag.
fn wait_for_interrupt() {
    let start = Instant::now();
    while process_guard::interrupted().is_none() {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "signal handler never raised the interrupt flag"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}
