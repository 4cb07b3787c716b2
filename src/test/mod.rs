mod arp_match;
mod asn_text;
mod bps_fields;
mod expr;
mod iter_args;
mod packet;
mod payload;
