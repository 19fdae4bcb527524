//! Natural-language support assistant over a MongoDB database, in a strictly linted crate.

// Interdiction stricte de pratiques dangereuses ou non idiomatiques
#![deny(unsafe_code)] // Le code unsafe est interdit
#![warn(missing_docs)] // Toute fonction, struct, enum ou module public doit être documenté
#![warn(dead_code)] // Le code inutilisé est signalé
#![deny(non_camel_case_types)]
// Les types doivent suivre la convention CamelCase (exception explicite possible au besoin)

// Options supplémentaires pour ne rien laisser passer
#![warn(unused_imports)] // Les imports inutilisés sont signalés
#![warn(unused_variables)] // Les variables inutilisées sont signalées
#![deny(unused_must_use)] // Oblige à gérer explicitement les Result et Option
#![deny(non_snake_case)] // Les noms de variables et fonctions doivent être en snake_case
#![deny(non_upper_case_globals)] // Les constantes et globals doivent être en MAJUSCULE
#![deny(nonstandard_style)] // Empêche tout style de code non standard
#![forbid(unsafe_op_in_unsafe_fn)]
// Interdit l'utilisation d'unsafe même dans une fonction unsafe

// Clippy pour stricte discipline
#![deny(clippy::all)] // Active toutes les lints Clippy standard
#![deny(clippy::pedantic)] // Active les lints très strictes de Clippy
#![deny(clippy::nursery)] // Active les lints expérimentales
#![deny(clippy::unwrap_used)] // Interdit unwrap()
#![deny(clippy::expect_used)] // Interdit expect()
#![deny(clippy::panic)] // Interdit panic!()
#![deny(clippy::print_stdout)] // Interdit println!() en production
#![deny(clippy::todo)] // Interdit les TODO dans le code
#![deny(clippy::unimplemented)] // Interdit les fonctions non implémentées
#![deny(clippy::unwrap_in_result)] // Interdit unwrap() sur Result
#![deny(clippy::module_inception)] // Interdit un module ayant le même nom que le crate
#![deny(clippy::redundant_clone)] // Interdit les clones inutiles
#![deny(clippy::too_many_arguments)] // Limite le nombre d’arguments des fonctions
#![deny(clippy::cognitive_complexity)] // Limite la complexité cognitive des fonctions
// Les tests peuvent utiliser unwrap() et panic!()
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)
)]

// Lints pour sécurité et robustesse
#![deny(overflowing_literals)] // Interdit les littéraux qui débordent

/// Configuration, errors and identifiers shared by every module.
pub mod common;
/// Conversation turns, session storage and feedback.
pub mod conversation;
/// Document-database seam and the MongoDB implementation.
pub mod database;
/// Text-completion seam and providers (OpenAI-compatible, Ollama).
pub mod llm;
/// Intent routing, query synthesis and presentation.
pub mod pipeline;
/// Query parsing, guarding, execution and tabular results.
pub mod query;
/// Schema descriptions for grounding generation.
pub mod schema;
/// HTTP server and API routes.
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::unused_async
)]
pub mod server;
/// Entry helpers to start the assistant.
pub mod start_quadz_agent;

#[cfg(test)]
mod testing;
