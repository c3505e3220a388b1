// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! WRITE-AFTER-WRITE's commit body is identical to OPTIMISTIC's (§4.5): the
//! two flavors diverge only in which operations populate the conflict set,
//! handled inline in [`super::TxContext::access`] and
//! [`super::TxContext::log_update`]. Kept as its own module, mirroring §2's
//! component table treating each flavor as a named part of the Transactional
//! Context, even though there's no WAW-specific commit code to add.

pub(crate) use super::optimistic::commit;
