mod commands;
mod fix_basic;
mod identity;
mod loading;
mod statics;
