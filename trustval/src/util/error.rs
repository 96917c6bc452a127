//! Error types

use core::fmt;

use der::asn1::ObjectIdentifier;

/// Result type
pub type Result<T> = core::result::Result<T, Error>;

/// Reasons a certification path may be rejected
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum PathValidationStatus {
    /// No errors were encountered while validating certification path
    Valid,
    /// NameChainingFailure occurs when the subject name of a superior certificate does not match
    /// the issuer name of the immediately subordinate certificate.
    NameChainingFailure,
    /// SignatureVerificationFailure occurs when the subject public key of a superior certificate
    /// does not verify the signature of the immediately subordinate certificate (or CRL).
    SignatureVerificationFailure,
    /// InvalidNotBeforeDate occurs when a certificate contains a notBefore date that is after the
    /// time of interest.
    InvalidNotBeforeDate,
    /// InvalidNotAfterDate occurs when a certificate contains a notAfter date that is before the
    /// time of interest.
    InvalidNotAfterDate,
    /// MissingBasicConstraints occurs when an intermediate CA certificate does not contain a
    /// basicConstraints extension.
    MissingBasicConstraints,
    /// InvalidBasicConstraints occurs when an intermediate CA certificate contains a
    /// basicConstraints extension with the cA field set to false.
    InvalidBasicConstraints,
    /// InvalidPathLength occurs when a pathLenConstraint asserted by an intermediate CA
    /// certificate is violated.
    InvalidPathLength,
    /// InvalidKeyUsage occurs when an intermediate CA certificate lacks keyCertSign or when a CRL
    /// issuer lacks cRLSign.
    InvalidKeyUsage,
    /// NullPolicySet occurs when the valid_policy_tree becomes NULL while explicit policy is required.
    NullPolicySet,
    /// UnprocessedCriticalExtension occurs when a certificate features a critical extension that
    /// is not processed during certification path validation.
    UnprocessedCriticalExtension,
    /// MissingTrustAnchor occurs when validation is attempted with no trust anchors.
    MissingTrustAnchor,
    /// EncodingError occurs when an object cannot be parsed.
    EncodingError,
    /// NoPathsFound occurs when no chain could be built from the target to a trust anchor.
    NoPathsFound,
    /// DepthExceeded occurs when a path has more intermediate CA certificates than permitted.
    DepthExceeded,
    /// NameMismatch occurs when the target certificate does not match any acceptable peer name.
    NameMismatch,
    /// CertificateRevoked occurs when a CRL lists the serial number of the certificate being checked.
    CertificateRevoked,
    /// CertificateRevokedEndEntity occurs when the end entity certificate has been revoked.
    CertificateRevokedEndEntity,
    /// CertificateRevokedIntermediateCa occurs when an intermediate CA certificate has been revoked.
    CertificateRevokedIntermediateCa,
    /// RevocationStatusNotDetermined occurs when no usable CRL was available for a certificate.
    RevocationStatusNotDetermined,
}

/// Error type
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// PathValidationError encountered
    PathValidation(PathValidationStatus),
    /// NotFound occurs when an action failed because a necessary artifact was not found.
    NotFound,
    /// Unrecognized occurs when an error conditions does not match anything else here.
    Unrecognized,
    /// A URI scheme was encountered that is not valid in given context, i.e., ldap URI presented
    /// to the HTTP CRL fetcher
    InvalidUriScheme,
    /// An artifact could not be parsed
    ParseError,
    /// A CRL was found to be incompatible with certificate whose revocation status is sought.
    CrlIncompatible,
    /// An indirect CRL was found. Indirect CRLs are not supported.
    UnsupportedIndirectCrl,
    /// A CRL was ignored due to an unrecognized critical extension.
    UnsupportedCrlExtension,
    /// A CRL entry was ignored due to an unrecognized critical extension.
    UnsupportedCrlEntryExtension,
    /// A signature or public key algorithm is not supported by the crypto provider.
    UnsupportedAlgorithm(ObjectIdentifier),
    /// A networking issue occurred.
    NetworkError,
    /// Asn1Error is used to propagate error information from the der crate.
    Asn1Error(der::Error),
    /// Error encapsulates an error derived from [std::io::ErrorKind]
    StdIoError(std::io::ErrorKind),
    /// Configuration presented to a constructor was missing or malformed
    Misconfiguration(String),
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Error {
        Error::Asn1Error(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::StdIoError(err.kind())
    }
}

impl fmt::Display for PathValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathValidationStatus::Valid => write!(f, "Valid"),
            PathValidationStatus::NameChainingFailure => write!(f, "Name chaining failure"),
            PathValidationStatus::SignatureVerificationFailure => {
                write!(f, "Signature verification failure")
            }
            PathValidationStatus::InvalidNotBeforeDate => write!(f, "InvalidNotBeforeDate"),
            PathValidationStatus::InvalidNotAfterDate => write!(f, "InvalidNotAfterDate"),
            PathValidationStatus::MissingBasicConstraints => write!(f, "MissingBasicConstraints"),
            PathValidationStatus::InvalidBasicConstraints => write!(f, "InvalidBasicConstraints"),
            PathValidationStatus::InvalidPathLength => write!(f, "InvalidPathLength"),
            PathValidationStatus::InvalidKeyUsage => write!(f, "InvalidKeyUsage"),
            PathValidationStatus::NullPolicySet => write!(f, "NullPolicySet"),
            PathValidationStatus::UnprocessedCriticalExtension => {
                write!(f, "UnprocessedCriticalExtension")
            }
            PathValidationStatus::MissingTrustAnchor => write!(f, "MissingTrustAnchor"),
            PathValidationStatus::EncodingError => write!(f, "EncodingError"),
            PathValidationStatus::NoPathsFound => write!(f, "NoPathsFound"),
            PathValidationStatus::DepthExceeded => write!(f, "DepthExceeded"),
            PathValidationStatus::NameMismatch => write!(f, "NameMismatch"),
            PathValidationStatus::CertificateRevoked => write!(f, "CertificateRevoked"),
            PathValidationStatus::CertificateRevokedEndEntity => {
                write!(f, "CertificateRevokedEndEntity")
            }
            PathValidationStatus::CertificateRevokedIntermediateCa => {
                write!(f, "CertificateRevokedIntermediateCa")
            }
            PathValidationStatus::RevocationStatusNotDetermined => {
                write!(f, "RevocationStatusNotDetermined")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PathValidation(pvs) => write!(f, "PathValidation: {}", pvs),
            Error::NotFound => write!(f, "NotFound"),
            Error::Unrecognized => write!(f, "Unrecognized"),
            Error::InvalidUriScheme => write!(f, "InvalidUriScheme"),
            Error::ParseError => write!(f, "ParseError"),
            Error::CrlIncompatible => write!(f, "CrlIncompatible"),
            Error::UnsupportedIndirectCrl => write!(f, "UnsupportedIndirectCrl"),
            Error::UnsupportedCrlExtension => write!(f, "UnsupportedCrlExtension"),
            Error::UnsupportedCrlEntryExtension => write!(f, "UnsupportedCrlEntryExtension"),
            Error::UnsupportedAlgorithm(oid) => write!(f, "UnsupportedAlgorithm: {}", oid),
            Error::NetworkError => write!(f, "NetworkError"),
            Error::Asn1Error(e) => write!(f, "Asn1Error: {}", e),
            Error::StdIoError(e) => write!(f, "StdIoError: {:?}", e),
            Error::Misconfiguration(msg) => write!(f, "Misconfiguration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[test]
fn error_test() {
    let s = format!(
        "{}",
        Error::PathValidation(PathValidationStatus::CertificateRevokedEndEntity)
    );
    assert_eq!(s, "PathValidation: CertificateRevokedEndEntity");
    let s = format!("{}", Error::PathValidation(PathValidationStatus::DepthExceeded));
    assert_eq!(s, "PathValidation: DepthExceeded");
    let s = format!("{}", Error::CrlIncompatible);
    assert_eq!(s, "CrlIncompatible");
    let s = format!(
        "{}",
        Error::UnsupportedAlgorithm(const_oid::db::rfc5912::ID_SHA_1)
    );
    assert_eq!(s, "UnsupportedAlgorithm: 1.3.14.3.2.26");
    let s = format!("{}", Error::Misconfiguration("bad depth".to_string()));
    assert_eq!(s, "Misconfiguration: bad depth");
    let e: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
    assert_eq!(e, Error::StdIoError(std::io::ErrorKind::NotFound));
}
