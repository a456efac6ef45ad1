//! `--explain` output: what a command does and what it touches.

use colored::Colorize;

/// Command explanation builder.
pub struct Explain {
    description: String,
    what_happens: Vec<String>,
    files: Vec<String>,
    privileged: Vec<String>,
}

impl Explain {
    fn new() -> Self {
        Self {
            description: String::new(),
            what_happens: Vec::new(),
            files: Vec::new(),
            privileged: Vec::new(),
        }
    }

    fn description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    fn step(mut self, step: &str) -> Self {
        self.what_happens.push(step.to_string());
        self
    }

    fn file(mut self, path: &str) -> Self {
        self.files.push(path.to_string());
        self
    }

    fn privileged(mut self, command: &str) -> Self {
        self.privileged.push(command.to_string());
        self
    }

    /// Commands that may touch the host trust stores.
    fn trust_commands(self) -> Self {
        self.privileged("certutil -addstore Root (Windows, machine then user store)")
            .privileged("security add-trusted-cert (macOS, System then login keychain)")
            .privileged("update-ca-certificates / update-ca-trust (Linux)")
            .privileged("certutil -A -d <nssdb> (Firefox and Chromium NSS databases)")
    }

    /// Print the explanation to stdout.
    pub fn print(&self) {
        println!();
        println!("{}", "=== What This Does ===".bold().cyan());
        println!("{}", self.description);
        println!();

        if !self.what_happens.is_empty() {
            println!("{}", "How it works:".bold());
            for (i, step) in self.what_happens.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
            println!();
        }

        if !self.files.is_empty() {
            println!("{}", "Files:".bold());
            for file in &self.files {
                println!("  {}", file.dimmed());
            }
            println!();
        }

        if !self.privileged.is_empty() {
            println!("{}", "May run (elevation may be requested):".bold().yellow());
            for command in &self.privileged {
                println!("  {command}");
            }
            println!();
        }

        println!("{}", "=== Results ===".bold().cyan());
        println!();
    }

    // ========================================================================
    // Factory methods for each command
    // ========================================================================

    pub fn ensure() -> Self {
        Self::new()
            .description("Makes sure a trusted server certificate is ready for local HTTPS.")
            .step("Reuses the current certificate if it is valid, covers every hostname and is not near expiry")
            .step("Otherwise asks mkcert for one (when installed and preferred)")
            .step("Otherwise signs one with the internal CA, creating the CA on first use")
            .step("Installs the issuing root into the trust stores; failures are reported, not fatal")
            .step("Prints a health report")
            .file("certs/ca.crt, certs/ca.key (internal CA)")
            .file("certs/server.crt, certs/server.key")
            .file("certs/cert_state.json")
            .trust_commands()
            .privileged("mkcert -install")
    }

    pub fn generate() -> Self {
        Self::new()
            .description("Issues a brand new server certificate from the internal CA.")
            .step("Loads the internal CA, creating it if missing or expired")
            .step("Signs a new leaf for localhost, loopback addresses and configured hostnames")
            .step("Replaces server.crt and server.key; trust stores are not touched")
            .file("certs/ca.crt, certs/ca.key")
            .file("certs/server.crt, certs/server.key")
    }

    pub fn mkcert() -> Self {
        Self::ensure()
            .description("Runs the ensure flow, asking mkcert first and falling back to the internal CA.")
    }

    pub fn no_mkcert() -> Self {
        Self::new()
            .description("Runs the ensure flow with the internal CA only; mkcert is never invoked.")
            .step("Reuses or issues a leaf signed by the internal CA")
            .step("Installs the internal root into the trust stores")
            .file("certs/ca.crt, certs/ca.key")
            .file("certs/server.crt, certs/server.key")
            .trust_commands()
    }

    pub fn install_ca() -> Self {
        Self::new()
            .description("Adds the internal root CA to the system and browser trust stores.")
            .step("Creates the internal CA if it does not exist yet")
            .step("Skips every store that already holds this exact certificate")
            .step("Reports each store separately; a refused store does not stop the others")
            .file("certs/ca.crt")
            .trust_commands()
    }

    pub fn bundle() -> Self {
        Self::new()
            .description("Exports the root CA with installer scripts so other devices can trust this server.")
            .step("Copies the public CA certificate (never the private key)")
            .step("Writes a Windows .bat installer and a macOS/Linux .sh installer")
            .step("Writes a README with manual steps")
            .file("certs/client_bundle/")
    }

    pub fn health() -> Self {
        Self::new()
            .description("Reports certificate health without changing anything.")
            .step("Parses the server certificate and checks dates, hostnames and issuer")
            .step("Looks up the issuing root in each trust store; browser stores alone do not count as trusted")
            .step("Healthy: valid and trusted. Degraded: valid but untrusted or near expiry. Unhealthy: missing, expired or unreadable")
    }

    pub fn check() -> Self {
        Self::new()
            .description("Quick check that the server certificate parses and is within its validity window.")
            .file("certs/server.crt")
    }

    pub fn instructions() -> Self {
        Self::new()
            .description("Prints step-by-step manual trust instructions for the internal root CA.")
            .file("certs/ca.crt")
    }
}
