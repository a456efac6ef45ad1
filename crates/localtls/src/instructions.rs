//! Human-readable install steps and standalone installer scripts.
//!
//! The scripts do what the trust strategies do, but run on a machine that
//! has nothing but the bundle: they locate `ca_certificate.crt` next to
//! themselves and call the platform tools directly.

use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::PathBuf;

use crate::inspect;
use crate::store::KeyPairStore;
use crate::trust::{Platform, RootCertificate, LINUX_LAYOUTS};
use localtls_core::{Result, TlsConfig, TlsError};

/// Name of the CA copy inside a bundle.
pub const BUNDLE_CA_NAME: &str = "ca_certificate.crt";

/// Facts interpolated into instructions and scripts.
#[derive(Debug, Clone)]
pub struct InstallContext {
    /// Root certificate; absolute on this host, bare file name inside a bundle
    pub ca_cert: PathBuf,
    /// Absolute path of the server certificate, `None` inside a bundle
    pub server_cert: Option<PathBuf>,
    /// Leaf not-after, if a leaf exists
    pub leaf_expiry: Option<DateTime<Utc>>,
    /// Hostnames the leaf covers
    pub hostnames: Vec<String>,
    /// Port the local HTTPS server listens on
    pub https_port: u16,
    /// Root display name, used as NSS nickname
    pub ca_name: String,
    /// File stem for the Linux anchor
    pub anchor_name: String,
    /// SHA-256 fingerprint of the root
    pub fingerprint: String,
}

impl InstallContext {
    /// Gather facts about the internal root and current leaf.
    ///
    /// Fails with [`TlsError::NoCertificateAuthority`] if `certs/ca.crt` is absent.
    pub fn from_store(store: &KeyPairStore, config: &TlsConfig) -> Result<Self> {
        let paths = store.paths();
        if !paths.ca_cert.is_file() {
            return Err(TlsError::NoCertificateAuthority {
                path: paths.ca_cert.clone(),
            });
        }
        let root = RootCertificate::from_file(&paths.ca_cert, config.ca_common_name())?;
        let leaf = inspect::read_certificate(&paths.server_cert).ok().flatten();

        Ok(Self {
            ca_cert: absolute(&paths.ca_cert),
            server_cert: Some(absolute(&paths.server_cert)),
            leaf_expiry: leaf.as_ref().map(|l| l.info.not_after),
            hostnames: leaf.map_or_else(|| config.required_hostnames(), |l| l.info.san),
            https_port: config.https_port,
            anchor_name: root.slug(),
            fingerprint: root.info.fingerprint,
            ca_name: root.name,
        })
    }

    /// The same facts as seen by whoever receives the bundle: the CA sits
    /// next to the README and this host's files do not exist there.
    #[must_use]
    pub fn for_bundle(self) -> Self {
        Self {
            ca_cert: PathBuf::from(BUNDLE_CA_NAME),
            server_cert: None,
            ..self
        }
    }
}

fn absolute(path: &std::path::Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Markdown instructions, optionally narrowed to one platform.
#[must_use]
pub fn render_markdown(ctx: &InstallContext, platform: Option<Platform>) -> String {
    let ca = ctx.ca_cert.display();
    let show = |p: Platform| platform.is_none() || platform == Some(p);
    let mut out = String::new();

    out.push_str("# Local HTTPS certificate installation\n\n");
    let _ = writeln!(
        out,
        "Trusting the root below makes browsers accept `https://localhost:{}` without warnings.\n",
        ctx.https_port
    );
    out.push_str("## System trust\n\n");

    if show(Platform::Windows) {
        let _ = writeln!(
            out,
            "### Windows (administrator PowerShell)\n\n```powershell\n\
             Import-Certificate -FilePath \"{ca}\" -CertStoreLocation Cert:\\LocalMachine\\Root\n```\n\n\
             Without administrator rights, trust it for your account only:\n\n```cmd\n\
             certutil -user -addstore -f Root \"{ca}\"\n```\n\n\
             Or open `certlm.msc`, go to Trusted Root Certification Authorities > Certificates, \
             right-click > All Tasks > Import and select the file above.\n"
        );
    }
    if show(Platform::MacOs) {
        let _ = writeln!(
            out,
            "### macOS\n\n```bash\n\
             sudo security add-trusted-cert -d -r trustRoot -k /Library/Keychains/System.keychain \"{ca}\"\n```\n"
        );
    }
    if show(Platform::Linux) {
        let _ = writeln!(
            out,
            "### Linux (Debian/Ubuntu)\n\n```bash\n\
             sudo cp \"{ca}\" /usr/local/share/ca-certificates/{anchor}.crt\n\
             sudo update-ca-certificates\n```\n\n\
             ### Linux (Fedora/RHEL)\n\n```bash\n\
             sudo cp \"{ca}\" /etc/pki/ca-trust/source/anchors/{anchor}.crt\n\
             sudo update-ca-trust extract\n```\n",
            anchor = ctx.anchor_name
        );
    }

    let port = ctx.https_port;
    let _ = writeln!(
        out,
        "## Browser trust\n\n\
         ### Chrome / Edge\n\n\
         Chrome and Edge use the system store on Windows and macOS. On Linux:\n\n```bash\n\
         certutil -d sql:$HOME/.pki/nssdb -A -t \"C,,\" -n \"{name}\" -i \"{ca}\"\n```\n\n\
         ### Firefox\n\n\
         1. Settings > Privacy & Security > Certificates > View Certificates\n\
         2. Authorities tab > Import, select `{ca}`\n\
         3. Tick \"Trust this CA to identify websites\"\n\n\
         ## Verify\n\n```bash\n\
         curl -I https://localhost:{port}/health\n```\n\n\
         The request should succeed without certificate errors. Restart the browser if it still warns.\n",
        name = ctx.ca_name
    );

    let expiry = ctx
        .leaf_expiry
        .map_or_else(|| "unknown".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    let _ = writeln!(
        out,
        "## Certificate details\n\n\
         - **CA certificate**: {ca}\n\
         - **CA fingerprint (SHA-256)**: {fp}",
        fp = ctx.fingerprint
    );
    if let Some(server) = &ctx.server_cert {
        let _ = writeln!(out, "- **Server certificate**: {}", server.display());
    }
    let _ = write!(
        out,
        "- **Valid until**: {expiry}\n- **Hostnames**: {hosts}",
        hosts = ctx.hostnames.join(", ")
    );
    out
}

const WINDOWS_TEMPLATE: &str = r#"@echo off
echo.
echo ================================================
echo  Local HTTPS - Certificate Setup
echo ================================================
echo.
set "CERT_FILE=%~dp0@CA_FILE@"

if not exist "%CERT_FILE%" (
    echo Error: certificate not found at %CERT_FILE%
    pause
    exit /b 1
)

echo Installing into Trusted Root Certification Authorities...
powershell -NoProfile -Command "try { Import-Certificate -FilePath '%CERT_FILE%' -CertStoreLocation 'Cert:\LocalMachine\Root' -ErrorAction Stop | Out-Null; exit 0 } catch { exit 1 }"
if %errorlevel% equ 0 goto done

echo Machine store needs administrator rights, installing for the current user...
certutil -user -addstore -f Root "%CERT_FILE%"
if %errorlevel% neq 0 (
    echo.
    echo Automatic installation failed. Import manually:
    echo 1. Run certlm.msc as administrator
    echo 2. Trusted Root Certification Authorities ^> Certificates
    echo 3. Right-click ^> All Tasks ^> Import ^> %CERT_FILE%
    pause
    exit /b 1
)

:done
echo.
echo Certificate installed. Restart your browser, then open https://localhost:@PORT@
pause
"#;

/// Windows batch installer.
#[must_use]
pub fn windows_script(ctx: &InstallContext) -> String {
    WINDOWS_TEMPLATE
        .replace("@CA_FILE@", BUNDLE_CA_NAME)
        .replace("@PORT@", &ctx.https_port.to_string())
        .replace('\n', "\r\n")
}

const UNIX_HEAD: &str = r#"#!/bin/sh
# Installs the bundled root certificate into the system and browser trust stores.
set -u

DIR="$(cd "$(dirname "$0")" && pwd)"
CERT_FILE="$DIR/@CA_FILE@"
CA_NAME="@CA_NAME@"
ANCHOR="@ANCHOR@"

if [ ! -f "$CERT_FILE" ]; then
    echo "Error: certificate not found at $CERT_FILE" >&2
    exit 1
fi

STATUS=0

# Import into every NSS database under $1 (Firefox profiles, Chromium nssdb).
trust_nss() {
    command -v certutil >/dev/null 2>&1 || return 0
    for db in "$1" "$1"/*; do
        if [ -f "$db/cert9.db" ]; then
            nssdb="sql:$db"
        elif [ -f "$db/cert8.db" ]; then
            nssdb="dbm:$db"
        else
            continue
        fi
        certutil -D -d "$nssdb" -n "$CA_NAME" >/dev/null 2>&1
        if certutil -A -d "$nssdb" -t "C,," -n "$CA_NAME" -i "$CERT_FILE"; then
            echo "Trusted in $nssdb"
        else
            STATUS=1
        fi
    done
}

case "$(uname -s)" in
Darwin)
    echo "macOS: adding to the System keychain (administrator password required)"
    if ! sudo security add-trusted-cert -d -r trustRoot -k /Library/Keychains/System.keychain "$CERT_FILE"; then
        echo "System keychain refused, trusting for the current user only"
        security add-trusted-cert -r trustRoot -k "$HOME/Library/Keychains/login.keychain-db" "$CERT_FILE" || STATUS=1
    fi
    trust_nss "$HOME/Library/Application Support/Firefox/Profiles"
    ;;
Linux)
    echo "Linux: adding to the system CA directory (administrator password required)"
    if false; then
        :
"#;

const UNIX_TAIL: &str = r#"    else
        echo "No known CA directory found; install $CERT_FILE manually" >&2
        STATUS=1
    fi
    trust_nss "$HOME/.pki/nssdb"
    trust_nss "$HOME/.mozilla/firefox"
    trust_nss "$HOME/snap/firefox/common/.mozilla/firefox"
    ;;
*)
    echo "Unsupported system: $(uname -s). Import $CERT_FILE as a trusted root manually." >&2
    exit 1
    ;;
esac

if [ "$STATUS" -eq 0 ]; then
    echo "Certificate installed. Restart your browser, then open https://localhost:@PORT@"
else
    echo "Some stores could not be updated; see the messages above." >&2
fi
exit "$STATUS"
"#;

/// POSIX shell installer for macOS and Linux.
#[must_use]
pub fn unix_script(ctx: &InstallContext) -> String {
    let mut script = UNIX_HEAD.to_string();
    for layout in LINUX_LAYOUTS {
        let _ = writeln!(
            script,
            "    elif [ -d {dir} ]; then\n        sudo cp \"$CERT_FILE\" \"{dir}/$ANCHOR.crt\" && sudo {rebuild} || STATUS=1",
            dir = layout.anchors_dir,
            rebuild = layout.rebuild.join(" ")
        );
    }
    script.push_str(UNIX_TAIL);
    script
        .replace("@CA_FILE@", BUNDLE_CA_NAME)
        .replace("@CA_NAME@", &ctx.ca_name.replace('"', ""))
        .replace("@ANCHOR@", &ctx.anchor_name)
        .replace("@PORT@", &ctx.https_port.to_string())
}
