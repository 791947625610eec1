// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod import;
pub mod init;
pub mod schedule;
pub mod sync;
pub mod watermark;

pub use import::import_products_command;
pub use init::init_command;
pub use schedule::schedule_command;
pub use sync::sync_command;
pub use watermark::watermark_command;
