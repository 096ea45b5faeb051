// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log payload handling: bounded logfmt parsing and semantic validation.

pub mod parser;
pub mod validator;
