//! Wire types and clients generated from `proto/inference.proto`.
//!
//! The services are declared without a proto package, so prost names the output
//! `_.rs` and calls go to root paths such as `/ExtractPdfService/Extract`.

tonic::include_proto!("_");
