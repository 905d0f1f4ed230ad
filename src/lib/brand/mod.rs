pub mod navico;
