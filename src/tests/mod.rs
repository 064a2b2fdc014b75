// Invariant suites
// Defense: state machine guarantees across arbitrary event histories
// Contract: fail-closed facade, fingerprint determinism, key-order independence
