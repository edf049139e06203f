use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::generate::to_facturae_xml;
use crate::core::{FacturaError, Invoice};
use crate::xml::has_element;

/// Applies an XAdES-EPES signature to a Facturae document.
///
/// Implementations hold the certificate; this crate never touches key
/// material directly.
pub trait XmlSigner: Send + Sync {
    fn sign(&self, xml: &str) -> Result<String, FacturaError>;
}

/// Signs by running an external program: unsigned XML on stdin, signed XML
/// on stdout. A non-zero exit status is an error carrying stderr.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSigner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl XmlSigner for CommandSigner {
    fn sign(&self, xml: &str) -> Result<String, FacturaError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                FacturaError::Signature(format!(
                    "cannot start signer {}: {e}",
                    self.program.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(xml.as_bytes())
                .map_err(|e| FacturaError::Signature(format!("cannot write to signer: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| FacturaError::Signature(format!("signer failed: {e}")))?;

        if !output.status.success() {
            return Err(FacturaError::Signature(format!(
                "signer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| FacturaError::Signature(format!("signer output is not UTF-8: {e}")))
    }
}

/// True if the document carries an XML-DSig `Signature` element.
pub fn is_signed(xml: &str) -> bool {
    has_element(xml, "Signature")
}

/// Generate the Facturae document for `invoice` and have `signer` sign it.
///
/// Signer output that no longer parses or lacks a signature is rejected.
pub fn sign_facturae(invoice: &Invoice, signer: &dyn XmlSigner) -> Result<String, FacturaError> {
    let xml = to_facturae_xml(invoice)?;
    let signed = signer.sign(&xml)?;
    if !is_signed(&signed) {
        return Err(FacturaError::Signature(
            "signer output does not contain a Signature element".into(),
        ));
    }
    tracing::info!(number = %invoice.number, "Facturae document signed");
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_signature_element() {
        assert!(is_signed(
            r#"<fe:Facturae xmlns:fe="urn:f" xmlns:ds="urn:d"><ds:Signature/></fe:Facturae>"#
        ));
        assert!(!is_signed("<fe:Facturae xmlns:fe=\"urn:f\"/>"));
        assert!(!is_signed("<broken"));
    }

    #[cfg(unix)]
    #[test]
    fn command_signer_reports_failures() {
        let missing = CommandSigner::new("/nonexistent/signer");
        assert!(matches!(missing.sign("<a/>"), Err(FacturaError::Signature(_))));

        let failing = CommandSigner::new("sh").args(["-c", "echo bad cert >&2; exit 3"]);
        let err = failing.sign("<a/>").unwrap_err().to_string();
        assert!(err.contains("bad cert"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn command_signer_pipes_through() {
        let cat = CommandSigner::new("cat");
        assert_eq!(cat.sign("<a/>").unwrap(), "<a/>");
    }
}
