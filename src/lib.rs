/*!
# ReagentFlow

Reagent inventory and stock movement tracking for a quality-control laboratory.

## Overview

Analysts record intakes and withdrawals of reagents against a shared inventory.
Every movement is written to an append-only ledger, the stock row it touches is
updated in place, and a manager is emailed once whenever a reagent drops to or
below its configured minimum. Managers review consolidated stock, mark reagents
as ordered, adjust minimums, maintain the analyst roster and export reports.

## Architecture

### Domain Layer
- **Inventory state** - Reducer-style owner of reagents, ledger, notifications
  and settings; every mutation goes through one entry point
- **Aggregation** - Groups reagent rows by name (and department) for the
  inventory, alert and withdrawal views
- **Movement rules** - Validation, container arithmetic and edge-triggered
  low-stock crossing detection

### Integration Layer
- **Remote store** - PostgREST tables `reagents`, `transactions` and `app_config`,
  replicated best-effort after each local change
- **Audit sink** - Fire-and-forget webhook events
- **Alert mailer** - EmailJS-style HTTP API or SMTP with handlebars templates
- **Label analyzer** - Image-to-JSON extraction of reagent labels

### Server Layer
- **Technologies**: Rust, axum, tokio
- Cookie sessions with analyst and manager roles
- JSON API plus CSV, XLSX and compressed backup downloads

## Modules

- **model**: Domain records and enums
- **error**: Error enums per concern
- **inventory**: Grouping, filtering and alert views
- **state**: Inventory state and movement handling
- **store**: Remote store trait, PostgREST client and in-memory store
- **audit**: Webhook audit events
- **mailer**: Low-stock alert emails
- **labels**: Label image analysis
- **auth**: Password hashing and sessions
- **config**: Runtime configuration
- **recorder**: The service tying state, store, audit and mail together
- **export**: CSV and XLSX reports
- **saving**: Gzip + bincode snapshots
- **app**: Routing and middleware

## REST API Endpoints

- `/api/login/analyst`, `/api/login/manager`, `/api/logout` - Sessions
- `/api/inventory`, `/api/history`, `/api/reagents` - Views
- `/api/intake`, `/api/withdrawal` - Stock movements
- `/api/alerts`, `/api/settings`, `/api/analysts` - Manager panel
- `/api/export/inventory.csv`, `/api/export/history.csv`,
  `/api/export/inventory.xlsx`, `/api/backup` - Downloads and restore
*/

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod inventory;
pub mod labels;
pub mod mailer;
pub mod model;
pub mod recorder;
pub mod saving;
pub mod state;
pub mod store;

#[cfg(feature = "web")]
pub mod app;

pub use error::FlowError;
pub use model::*;
pub use recorder::ReagentFlow;
