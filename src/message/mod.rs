// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of reading and writing of DNS messages.
//!
//! Messages are otherwise treated as opaque octet strings; only the
//! header, the question section, and the answer section are ever
//! decoded.

mod constants;
pub mod reader;
pub mod writer;

pub use constants::MAX_UDP_MESSAGE_SIZE;
pub use reader::{decode_name_at, decode_question, extract_answers, Question, Reader, Record};
pub use writer::build_failure;
